//! Capture surface coordination.
//!
//! Opening the floating capture window, handing it the page context it was
//! opened for, and turning context-menu clicks into note content. A video
//! page is paused while its capture surface is open and resumed after the
//! note is saved or the surface closes.

use crate::models::{ContextMenuItem, PageContext, RelayEvent, YoutubeContext};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};
use url::Url;

/// Something that can show the note capture UI.
pub trait CaptureSurface: Send + Sync {
    fn open(&self, context: Option<PageContext>);

    fn pause_video(&self, _url: &str) {}

    fn resume_video(&self, _url: &str) {}
}

/// Announces capture requests to subscribed UI surfaces.
pub struct EventCaptureSurface {
    events: broadcast::Sender<RelayEvent>,
}

impl EventCaptureSurface {
    pub fn new(events: broadcast::Sender<RelayEvent>) -> Self {
        Self { events }
    }
}

impl EventCaptureSurface {
    fn send(&self, event: RelayEvent) {
        // No subscribers just means no window is listening yet.
        if self.events.send(event).is_err() {
            debug!("no capture surface subscribed");
        }
    }
}

impl CaptureSurface for EventCaptureSurface {
    fn open(&self, context: Option<PageContext>) {
        self.send(RelayEvent::OpenCapture { context });
    }

    fn pause_video(&self, url: &str) {
        self.send(RelayEvent::PauseVideo {
            url: url.to_string(),
        });
    }

    fn resume_video(&self, url: &str) {
        self.send(RelayEvent::ResumeVideo {
            url: url.to_string(),
        });
    }
}

pub struct CaptureCoordinator {
    surface: Box<dyn CaptureSurface>,
    pending: Mutex<Option<PageContext>>,
    /// URL of the video page paused for the open capture surface.
    paused: Mutex<Option<String>>,
}

impl CaptureCoordinator {
    pub fn new(surface: Box<dyn CaptureSurface>) -> Self {
        Self {
            surface,
            pending: Mutex::new(None),
            paused: Mutex::new(None),
        }
    }

    /// Remember `context` for the surface and open it. A video page is paused.
    pub fn open(&self, context: Option<PageContext>) {
        let context = context.map(normalize_context);
        if let Ok(mut pending) = self.pending.lock() {
            *pending = context.clone();
        }
        let video_url = context
            .as_ref()
            .filter(|c| c.youtube.is_some())
            .map(|c| c.url.clone());
        info!(
            url = context.as_ref().map(|c| c.url.as_str()).unwrap_or(""),
            "opening capture surface"
        );
        self.surface.open(context);

        if let Some(url) = video_url {
            debug!(%url, "pausing video for capture");
            self.surface.pause_video(&url);
            if let Ok(mut paused) = self.paused.lock() {
                *paused = Some(url);
            }
        }
    }

    /// Resume the video paused by `open`, if any. Later calls do nothing.
    pub fn resume_video(&self) {
        let url = self.paused.lock().ok().and_then(|mut p| p.take());
        if let Some(url) = url {
            debug!(%url, "resuming video");
            self.surface.resume_video(&url);
        }
    }

    /// Hand the pending context to the caller. Later calls get `None`.
    pub fn take_pending(&self) -> Option<PageContext> {
        self.pending.lock().ok().and_then(|mut p| p.take())
    }
}

/// Note content for a context-menu click, or `None` when there is nothing to save.
pub fn context_menu_content(
    item: ContextMenuItem,
    selection: Option<&str>,
    context: &PageContext,
) -> Option<String> {
    let selection = selection.filter(|s| !s.trim().is_empty());
    match item {
        ContextMenuItem::SaveSelection => selection.map(|s| s.to_string()),
        ContextMenuItem::SavePage => {
            let body = match selection {
                Some(s) => s.to_string(),
                None => format!("Saved from: {}", context.url),
            };
            Some(format!("Page: {}\n\n{}", context.title, body))
        }
    }
}

/// `m:ss` below an hour, `h:mm:ss` above.
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

pub fn timestamped_url(video_id: &str, seconds: f64) -> String {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!(
        "https://www.youtube.com/watch?v={}&t={}s",
        urlencoding::encode(video_id),
        secs
    )
}

/// Fill in what the content script left out: the domain, and the YouTube
/// `timeString` and `timestampedUrl`.
pub fn normalize_context(mut context: PageContext) -> PageContext {
    if context.domain.is_empty() {
        if let Some(host) = Url::parse(&context.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
        {
            context.domain = host;
        }
    }
    if let Some(yt) = context.youtube.as_mut() {
        fill_youtube(yt);
    }
    context
}

fn fill_youtube(yt: &mut YoutubeContext) {
    if yt.time_string.is_none() {
        yt.time_string = Some(format_timestamp(yt.current_time));
    }
    if yt.timestamped_url.is_none() {
        if let Some(id) = yt.video_id.as_deref() {
            yt.timestamped_url = Some(timestamped_url(id, yt.current_time));
        }
    }
}
