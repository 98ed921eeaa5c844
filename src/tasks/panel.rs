use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rand::{SeedableRng, rngs::StdRng};
use reqwest::Url;
use tokio::select;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::LoadError;
use crate::events::{Displayed, PanelCommand, PanelSnapshot, PanelState};
use crate::loader::{PreloadedImage, ResourceLoader, resolve_image, resolve_source};
use crate::manifest::{Manifest, SlideDeck};
use crate::stage::{LayerId, Stage, layer_style};
use crate::timer::PausableTimer;
use crate::util::{clamp, clamp_str, shuffle};

#[derive(Debug, Clone, Default)]
pub struct PanelOptions {
    /// Seeds the slide shuffle; `None` draws from the OS.
    pub shuffle_seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attribute {
    Data,
    Width,
    Height,
    Interval,
    FadeDuration,
}

impl Attribute {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "data" => Some(Self::Data),
            "width" => Some(Self::Width),
            "height" => Some(Self::Height),
            "interval" => Some(Self::Interval),
            "fade-duration" | "fadeDuration" => Some(Self::FadeDuration),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Width => "width",
            Self::Height => "height",
            Self::Interval => "interval",
            Self::FadeDuration => "fade-duration",
        }
    }
}

/// Milliseconds from an attribute value; negative values clamp to zero and
/// non-numeric text is ignored.
fn parse_millis(raw: &str) -> Option<Duration> {
    let ms = clamp_str(raw, Some(0.0), None);
    ms.is_finite()
        .then(|| Duration::from_micros((ms * 1000.0).round() as u64))
}

#[derive(Debug)]
enum PanelEvent {
    ManifestLoaded {
        generation: u64,
        source: Url,
        result: Result<Manifest, LoadError>,
    },
    SlideReady {
        request: u64,
        index: usize,
        image_url: String,
        result: Result<PreloadedImage, LoadError>,
    },
    FadeFinished {
        request: u64,
        index: usize,
        image_url: String,
        previous: Option<LayerId>,
    },
    TimerFired {
        request: u64,
    },
}

/// Cloneable front end for a running panel task.
#[derive(Debug, Clone)]
pub struct PanelHandle {
    tx: Sender<PanelCommand>,
}

/// Command channel for [`run`] plus the handle that feeds it.
pub fn channel(buffer: usize) -> (PanelHandle, Receiver<PanelCommand>) {
    let (tx, rx) = mpsc::channel(buffer);
    (PanelHandle { tx }, rx)
}

impl PanelHandle {
    async fn send(&self, command: PanelCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow!("panel task has shut down"))
    }

    pub async fn set_attribute(
        &self,
        name: impl Into<String>,
        value: Option<String>,
    ) -> Result<()> {
        self.send(PanelCommand::SetAttribute {
            name: name.into(),
            value,
        })
        .await
    }

    /// Points the panel at a new manifest; same as setting `data`.
    pub async fn set_manifest_source(&self, url: impl Into<String>) -> Result<()> {
        self.set_attribute("data", Some(url.into())).await
    }

    pub async fn set_width(&self, width: impl Into<String>) -> Result<()> {
        self.set_attribute("width", Some(width.into())).await
    }

    pub async fn set_height(&self, height: impl Into<String>) -> Result<()> {
        self.set_attribute("height", Some(height.into())).await
    }

    pub async fn set_interval(&self, interval: Option<Duration>) -> Result<()> {
        let value = interval.map(|d| d.as_millis().to_string());
        self.set_attribute("interval", value).await
    }

    pub async fn set_fade_duration(&self, duration: Option<Duration>) -> Result<()> {
        let value = duration.map(|d| d.as_millis().to_string());
        self.set_attribute("fade-duration", value).await
    }

    pub async fn start(&self, index: i64) -> Result<()> {
        self.send(PanelCommand::Start(index)).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(PanelCommand::Stop).await
    }

    pub async fn next(&self) -> Result<()> {
        self.send(PanelCommand::Next).await
    }

    pub async fn previous(&self) -> Result<()> {
        self.send(PanelCommand::Previous).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(PanelCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(PanelCommand::Resume).await
    }

    pub async fn snapshot(&self) -> Result<PanelSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(PanelCommand::Snapshot(tx)).await?;
        rx.await.context("panel dropped snapshot request")
    }
}

/// Runs one slideshow panel until `cancel` fires.
///
/// All state lives in this task. Manifest fetches, preloads, fades and the
/// advance timer run as spawned work that reports back through an internal
/// queue, so the panel reacts to one event at a time in arrival order.
///
/// Rules:
/// - Every slide load bumps a request generation; completions from older
///   generations are dropped, except that a finished fade still removes the
///   layer it was replacing.
/// - Failed preloads skip to the next slide; once every slide has failed in a
///   row the panel waits one interval before trying again.
/// - Navigation wraps modulo the slide count; `start` clamps.
#[instrument(name = "panel", skip_all)]
pub async fn run<L, S>(
    mut commands: Receiver<PanelCommand>,
    displayed: Sender<Displayed>,
    loader: Arc<L>,
    stage: S,
    cancel: CancellationToken,
    options: PanelOptions,
) -> Result<()>
where
    L: ResourceLoader,
    S: Stage,
{
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut panel = ImagePanel::new(loader, stage, events_tx, displayed, &options);
    let mut commands_open = true;

    loop {
        select! {
            _ = cancel.cancelled() => break,

            maybe_cmd = commands.recv(), if commands_open => {
                match maybe_cmd {
                    Some(cmd) => panel.handle_command(cmd),
                    None => {
                        // Host dropped every handle; keep cycling until cancelled.
                        debug!("command channel closed");
                        commands_open = false;
                    }
                }
            }

            Some(event) = events_rx.recv() => panel.handle_event(event),
        }
    }

    panel.shutdown();
    Ok(())
}

struct ImagePanel<L, S> {
    loader: Arc<L>,
    stage: S,
    events: UnboundedSender<PanelEvent>,
    displayed: Sender<Displayed>,
    rng: StdRng,
    attributes: BTreeMap<String, String>,
    deck: SlideDeck,
    source: Option<Url>,
    current: usize,
    state: PanelState,
    request: u64,
    manifest_generation: u64,
    timer: Option<PausableTimer>,
    current_layer: Option<LayerId>,
    consecutive_failures: usize,
}

impl<L, S> ImagePanel<L, S>
where
    L: ResourceLoader,
    S: Stage,
{
    fn new(
        loader: Arc<L>,
        stage: S,
        events: UnboundedSender<PanelEvent>,
        displayed: Sender<Displayed>,
        options: &PanelOptions,
    ) -> Self {
        let rng = match options.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            loader,
            stage,
            events,
            displayed,
            rng,
            attributes: BTreeMap::new(),
            deck: SlideDeck::default(),
            source: None,
            current: 0,
            state: PanelState::Idle,
            request: 0,
            manifest_generation: 0,
            timer: None,
            current_layer: None,
            consecutive_failures: 0,
        }
    }

    fn handle_command(&mut self, command: PanelCommand) {
        match command {
            PanelCommand::SetAttribute { name, value } => self.attribute_changed(&name, value),
            PanelCommand::Start(index) => self.start(index),
            PanelCommand::Stop => self.stop(),
            PanelCommand::Next => self.next(),
            PanelCommand::Previous => self.previous(),
            PanelCommand::Pause => self.pause(),
            PanelCommand::Resume => self.resume(),
            PanelCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn handle_event(&mut self, event: PanelEvent) {
        match event {
            PanelEvent::ManifestLoaded {
                generation,
                source,
                result,
            } => self.manifest_loaded(generation, source, result),
            PanelEvent::SlideReady {
                request,
                index,
                image_url,
                result,
            } => self.slide_ready(request, index, image_url, result),
            PanelEvent::FadeFinished {
                request,
                index,
                image_url,
                previous,
            } => self.fade_finished(request, index, image_url, previous),
            PanelEvent::TimerFired { request } => {
                if request == self.request && self.state != PanelState::Stopped {
                    self.next();
                } else {
                    debug!(request, current = self.request, "ignoring stale timer");
                }
            }
        }
    }

    fn attribute_changed(&mut self, name: &str, value: Option<String>) {
        let Some(attribute) = Attribute::from_name(name) else {
            debug!(name, "ignoring unobserved attribute");
            return;
        };
        match &value {
            Some(v) => self.attributes.insert(attribute.name().to_owned(), v.clone()),
            None => self.attributes.remove(attribute.name()),
        };

        match attribute {
            Attribute::Data => match value {
                Some(url) => self.set_manifest_source(&url),
                None => debug!("data attribute removed"),
            },
            Attribute::Width | Attribute::Height => {}
            Attribute::Interval | Attribute::FadeDuration => {
                debug!(attribute = attribute.name(), value = ?value, "timing override changed");
            }
        }
    }

    fn attribute_millis(&self, attribute: Attribute) -> Option<Duration> {
        self.attributes
            .get(attribute.name())
            .and_then(|raw| parse_millis(raw))
    }

    fn slide_interval(&self) -> Duration {
        self.attribute_millis(Attribute::Interval)
            .unwrap_or(self.deck.slide_interval)
    }

    fn fade_duration(&self) -> Duration {
        self.attribute_millis(Attribute::FadeDuration)
            .unwrap_or(self.deck.transition_duration)
    }

    fn set_manifest_source(&mut self, raw: &str) {
        let source = match resolve_source(raw) {
            Ok(url) => url,
            Err(err) => {
                error!(source = raw, error = %err, "data loading failed");
                return;
            }
        };
        self.manifest_generation += 1;
        let generation = self.manifest_generation;
        if self.state == PanelState::Idle {
            self.state = PanelState::Loading;
        }
        info!(url = %source, "loading manifest");

        let loader = Arc::clone(&self.loader);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = loader.fetch_manifest(&source).await;
            let _ = events.send(PanelEvent::ManifestLoaded {
                generation,
                source,
                result,
            });
        });
    }

    fn manifest_loaded(
        &mut self,
        generation: u64,
        source: Url,
        result: Result<Manifest, LoadError>,
    ) {
        if generation != self.manifest_generation {
            debug!(url = %source, generation, "ignoring superseded manifest");
            return;
        }
        let manifest = match result {
            Ok(manifest) => manifest,
            Err(err) => {
                error!(url = %source, error = %err, "data loading failed");
                if self.state == PanelState::Loading {
                    self.state = PanelState::Idle;
                }
                return;
            }
        };

        let mut deck = SlideDeck::from(manifest);
        if deck.shuffle {
            shuffle(&mut deck.slides, &mut self.rng);
        }
        info!(
            url = %source,
            slides = deck.slides.len(),
            interval = ?deck.slide_interval,
            transition = ?deck.transition_duration,
            shuffled = deck.shuffle,
            "manifest loaded"
        );
        self.deck = deck;
        self.source = Some(source);
        self.current = 0;
        self.consecutive_failures = 0;
        self.start(0);
    }

    fn start(&mut self, index: i64) {
        let len = self.deck.slides.len();
        if len == 0 {
            warn!("no slides loaded; slideshow not started");
            self.timer = None;
            self.state = PanelState::Idle;
            return;
        }
        let index = clamp(index as f64, Some(0.0), Some((len - 1) as f64)) as usize;
        info!(index, slides = len, "slideshow started");
        self.load_slide(index);
    }

    fn stop(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
        }
        // Drop whatever preload or fade is still in flight.
        self.request += 1;
        self.state = PanelState::Stopped;
        info!(index = self.current, "slideshow stopped");
    }

    fn next(&mut self) {
        let len = self.deck.slides.len();
        if len == 0 {
            warn!("no slides loaded; next ignored");
            return;
        }
        self.load_slide((self.current + 1) % len);
    }

    fn previous(&mut self) {
        let len = self.deck.slides.len();
        if len == 0 {
            warn!("no slides loaded; previous ignored");
            return;
        }
        self.load_slide((self.current + len - 1) % len);
    }

    fn pause(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.pause();
                debug!(remaining = ?timer.remaining(), "slideshow paused");
            }
            None => debug!("no timer armed; pause ignored"),
        }
    }

    fn resume(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.resume();
                debug!(remaining = ?timer.remaining(), "slideshow resumed");
            }
            None => debug!("no timer armed; resume ignored"),
        }
    }

    fn load_slide(&mut self, index: usize) {
        self.request += 1;
        let request = self.request;
        self.current = index;
        self.state = PanelState::Advancing;
        // The countdown for the outgoing slide is re-armed once the fade ends.
        self.timer = None;

        let (image_url, resolved) = self.resolve_slide(index);
        debug!(index, request, url = %image_url, "loading slide");
        match resolved {
            Ok(url) => {
                let loader = Arc::clone(&self.loader);
                let events = self.events.clone();
                tokio::spawn(async move {
                    let result = loader.preload(&url).await;
                    let _ = events.send(PanelEvent::SlideReady {
                        request,
                        index,
                        image_url,
                        result,
                    });
                });
            }
            // Routed through the queue like any other failure so the skip
            // never recurses.
            Err(err) => {
                let _ = self.events.send(PanelEvent::SlideReady {
                    request,
                    index,
                    image_url,
                    result: Err(err),
                });
            }
        }
    }

    fn resolve_slide(&self, index: usize) -> (String, Result<Url, LoadError>) {
        let Some(image_url) = self
            .deck
            .slides
            .get(index)
            .and_then(|slide| slide.image_url(&self.deck.master_path))
        else {
            return (
                String::new(),
                Err(LoadError::InvalidUrl(format!("slide {index} has no src"))),
            );
        };
        let resolved = match &self.source {
            Some(base) => resolve_image(base, &image_url),
            None => Url::parse(&image_url)
                .map_err(|err| LoadError::InvalidUrl(format!("{image_url}: {err}"))),
        };
        (image_url, resolved)
    }

    fn slide_ready(
        &mut self,
        request: u64,
        index: usize,
        image_url: String,
        result: Result<PreloadedImage, LoadError>,
    ) {
        if request != self.request {
            debug!(request, index, url = %image_url, "dropping stale preload");
            return;
        }

        if let Err(err) = result {
            warn!(url = %image_url, index, error = %err, "image loading failed");
            self.consecutive_failures += 1;
            if self.consecutive_failures >= self.deck.slides.len() {
                let interval = self.slide_interval();
                warn!(
                    failures = self.consecutive_failures,
                    retry_in = ?interval,
                    "every slide failed to load; backing off"
                );
                self.consecutive_failures = 0;
                self.arm_timer(interval);
            } else {
                self.next();
            }
            return;
        }
        self.consecutive_failures = 0;

        let custom = self
            .deck
            .slides
            .get(index)
            .and_then(|slide| slide.style.as_deref());
        let style = layer_style(custom, &image_url);
        let previous = self.current_layer;
        let layer = self.stage.mount(&image_url, &style, previous);
        if let Some(previous) = previous {
            self.stage.set_z_index(previous, -1);
            self.stage.set_z_index(layer, 1);
        }
        let fade = self.fade_duration();
        self.stage.fade_in(layer, fade);
        self.current_layer = Some(layer);
        debug!(index, layer, ?fade, url = %image_url, "cross-fade started");

        let events = self.events.clone();
        tokio::spawn(async move {
            sleep(fade).await;
            let _ = events.send(PanelEvent::FadeFinished {
                request,
                index,
                image_url,
                previous,
            });
        });
    }

    fn fade_finished(
        &mut self,
        request: u64,
        index: usize,
        image_url: String,
        previous: Option<LayerId>,
    ) {
        if let Some(previous) = previous {
            self.stage.remove(previous);
        }
        if request != self.request {
            debug!(request, index, "fade finished for superseded slide");
            return;
        }

        self.state = PanelState::Displayed;
        info!(index, url = %image_url, "slide displayed");
        if let Err(err) = self.displayed.try_send(Displayed { index, image_url }) {
            debug!(error = %err, "displayed notification dropped");
        }
        let interval = self.slide_interval();
        self.arm_timer(interval);
    }

    // Replacing the previous timer drops it, which cancels its countdown.
    fn arm_timer(&mut self, interval: Duration) {
        let request = self.request;
        let events = self.events.clone();
        self.timer = Some(PausableTimer::new(interval, move || {
            let _ = events.send(PanelEvent::TimerFired { request });
        }));
        debug!(request, ?interval, "advance timer armed");
    }

    fn snapshot(&self) -> PanelSnapshot {
        PanelSnapshot {
            state: self.state,
            current_index: self.current,
            slide_count: self.deck.slides.len(),
            current_layer: self.current_layer,
            timer_running: self.timer.as_ref().is_some_and(PausableTimer::is_running),
            attributes: self.attributes.clone(),
        }
    }

    fn shutdown(&mut self) {
        self.timer = None;
        info!("panel shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_names_round_trip() {
        for name in crate::events::OBSERVED_ATTRIBUTES {
            let attribute = Attribute::from_name(name).unwrap();
            assert_eq!(attribute.name(), *name);
        }
        assert_eq!(
            Attribute::from_name("fadeDuration"),
            Some(Attribute::FadeDuration)
        );
        assert_eq!(Attribute::from_name("style"), None);
    }

    #[test]
    fn millis_overrides_parse_and_clamp() {
        assert_eq!(parse_millis("250"), Some(Duration::from_millis(250)));
        assert_eq!(parse_millis("12.5"), Some(Duration::from_micros(12_500)));
        assert_eq!(parse_millis("-3"), Some(Duration::ZERO));
        assert_eq!(parse_millis("fast"), None);
        assert_eq!(parse_millis("inf"), None);
    }
}
