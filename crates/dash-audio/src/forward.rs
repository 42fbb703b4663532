use std::time::Duration;
use tracing::{debug, info, warn};

use dash_link::{Link, Shutdown};
use dash_proto::{DisplayUpdate, HeadUnitEvent};

use crate::dispatch::Dispatcher;
use crate::dsp::DspControl;
use crate::media::MediaSource;

const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(100);

/// Reads head-unit commands and answers them until shutdown.
pub async fn run_event_loop<L, D>(link: &L, dispatcher: &Dispatcher<D>, mut shutdown: Shutdown)
where
    L: Link,
    D: DspControl,
{
    info!("events: started");
    while !shutdown.is_triggered() {
        let line = tokio::select! {
            _ = shutdown.triggered() => break,
            line = link.read_line() => line,
        };
        let Some(line) = line.filter(|l| !l.trim().is_empty()) else {
            if shutdown.sleep(EMPTY_READ_BACKOFF).await {
                break;
            }
            continue;
        };

        let event = HeadUnitEvent::parse(&line);
        debug!("events: {:?}", event);
        match dispatcher.handle(&event).await {
            Ok(Some(reply)) => {
                if let Err(e) = link.send(reply.to_line().as_bytes()).await {
                    warn!("events: reply failed: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("events: {:?} failed: {:#}", event, e),
        }
    }
    info!("events: stopped");
}

/// Pushes the current track to the head-unit every `period`.
pub async fn run_now_playing<L, M>(link: &L, media: &M, period: Duration, mut shutdown: Shutdown)
where
    L: Link,
    M: MediaSource,
{
    info!("media: started (every {:?})", period);
    while !shutdown.is_triggered() {
        match media.now_playing().await {
            Ok(Some(np)) => {
                let updates = [
                    DisplayUpdate::TrackTitle(np.track.title),
                    DisplayUpdate::TrackArtist(np.track.artist),
                    DisplayUpdate::TrackDuration(np.track.duration),
                    DisplayUpdate::TrackElapsed(np.position),
                ];
                for u in &updates {
                    if let Err(e) = link.send(u.to_line().as_bytes()).await {
                        warn!("media: send failed: {}", e);
                        break;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!("media: {:#}", e),
        }
        if shutdown.sleep(period).await {
            break;
        }
    }
    info!("media: stopped");
}
