//! Subcommand implementations.

use crate::cli::{JoinArgs, ReplayArgs};
use anyhow::{Context, Result};
use inkboard_core::board::BoardSession;
use inkboard_core::clock::Clock;
use inkboard_core::config::{CanvasConfig, ClientConfig};
use inkboard_core::event::{DrawingEvent, decode_batch};
use inkboard_core::input::{MouseButton, PointerEvent};
use inkboard_core::session::User;
use inkboard_core::transport::{ConnectionChange, StompConfig, StompTransport, Transport};
use inkboard_render::BoardCanvas;
use kurbo::Point;
use std::path::Path;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Load the client config from `path`, or the defaults, with environment
/// overrides applied either way.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let config = ClientConfig::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config from the environment".to_string(),
    })?;
    Ok(config)
}

/// Read a JSON array of drawing events. Entries that do not decode are
/// skipped with a warning.
pub fn load_events(path: &Path) -> Result<Vec<DrawingEvent>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let entries: Vec<serde_json::Value> =
        serde_json::from_str(&text).with_context(|| format!("Invalid event log {}", path.display()))?;
    Ok(decode_batch(entries))
}

fn canvas_config(base: &CanvasConfig, args: &ReplayArgs) -> CanvasConfig {
    CanvasConfig {
        width: args.width.unwrap_or(base.width),
        height: args.height.unwrap_or(base.height),
        background: args.background.clone().unwrap_or_else(|| base.background.clone()),
    }
}

pub fn replay(args: &ReplayArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let events = load_events(&args.events)?;
    let mut canvas = BoardCanvas::new(&canvas_config(&config.canvas, args))?;
    canvas.replay(&events, &[]);
    canvas.write_png(&args.output)?;
    log::info!("Rendered {} events to {}", events.len(), args.output.display());
    Ok(())
}

pub fn join(args: &JoinArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut user = User::new(args.user_id, args.name.clone());
    user.photo_ref = args.photo.clone();

    let transport = StompTransport::new(StompConfig::from_client(&config));
    let mut session = BoardSession::new(transport, &config, args.board, Some(user))?;
    let mut canvas = BoardCanvas::new(&config.canvas)?;

    log::info!("Joining board {} at {}", args.board, config.broker_url);
    session.connect()?;
    follow_board(&mut session, &mut canvas, Duration::from_secs(args.seconds), args.demo_stroke);

    let views = session.cursor_views();
    for view in &views {
        log::info!("{} is at ({:.0}, {:.0})", view.label, view.position.x, view.position.y);
    }
    canvas.snapshot_with_cursors(&views).write_png(&args.output)?;
    log::info!(
        "Saved board {} ({} remote events, {} cursors) to {}",
        args.board,
        session.remote().len(),
        views.len(),
        args.output.display()
    );
    session.close();
    Ok(())
}

/// Pump the session and keep the canvas current until `duration` elapses.
///
/// Runs at least one iteration. Returns how many redraws were applied.
pub fn follow_board<T, C>(
    session: &mut BoardSession<T, C>,
    canvas: &mut BoardCanvas,
    duration: Duration,
    demo_stroke: bool,
) -> usize
where
    T: Transport,
    C: Clock + Clone,
{
    let started = Instant::now();
    let mut demo_pending = demo_stroke;
    let mut redraws = 0;
    loop {
        for change in session.pump() {
            match change {
                ConnectionChange::Connected => log::info!("Connected to board {}", session.board_id()),
                ConnectionChange::Disconnected => log::warn!("Lost connection to board {}", session.board_id()),
            }
        }
        if demo_pending && session.is_connected() {
            draw_demo_stroke(session);
            demo_pending = false;
        }
        if let Some(plan) = session.take_redraw() {
            canvas.apply(&plan, session.remote().events(), session.local().events());
            redraws += 1;
        }
        if started.elapsed() >= duration {
            return redraws;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// A short diagonal stroke from (100, 100) to (300, 300).
fn draw_demo_stroke<T, C>(session: &mut BoardSession<T, C>)
where
    T: Transport,
    C: Clock + Clone,
{
    let start = Point::new(100.0, 100.0);
    session.handle_pointer_event(PointerEvent::Down {
        position: start,
        button: MouseButton::Left,
    });
    for step in 1..=10 {
        let offset = step as f64 * 20.0;
        session.handle_pointer_event(PointerEvent::Move {
            position: Point::new(start.x + offset, start.y + offset),
        });
    }
    session.handle_pointer_event(PointerEvent::Up {
        position: Point::new(300.0, 300.0),
        button: MouseButton::Left,
    });
    log::debug!("Drew demo stroke on board {}", session.board_id());
}
