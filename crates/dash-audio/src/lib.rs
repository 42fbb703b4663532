pub mod dispatch;
pub mod dsp;
pub mod forward;
pub mod media;

pub use dispatch::Dispatcher;
pub use dsp::{DspControl, FileDsp};
pub use forward::{run_event_loop, run_now_playing};
pub use media::{MediaSource, NowPlaying, NowPlayingFile, Track};
