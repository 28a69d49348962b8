use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use eframe::egui;
use tracing::{error, info, Level};
use tracing_subscriber::util::SubscriberInitExt;

use isa_video_bridge::trace::{self, HostOp, DEMO_HEIGHT, DEMO_ROWS};
use isa_video_bridge::{screenshot, Bridge, BridgeConfig, BridgeError, BridgeEvent, Frame, FrameCapture};

/// Headless runs stop here unless `--frames` says otherwise.
const DEFAULT_HEADLESS_FRAMES: u64 = 60;

/// The bridge free-runs one frame whenever the host is quiet this long.
const FRAME_PERIOD: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(version, about = "ISA video bridge emulator")]
struct Args {
    /// Board configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Run without a window
    #[arg(long)]
    headless: bool,

    /// Save the last frame as PNG on exit
    #[arg(long)]
    screenshot: Option<PathBuf>,

    #[arg(long, default_value = "warn")]
    log_level: Level,
}

/// Host thread -> bridge thread.
enum HostMessage {
    Trace(Vec<HostOp>),
    Shutdown,
}

fn main() -> Result<(), BridgeError> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .compact()
        .finish()
        .init();

    let config = match &args.config {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };

    let frames = match (args.frames, args.headless) {
        (Some(n), _) => Some(n),
        (None, true) => Some(DEFAULT_HEADLESS_FRAMES),
        (None, false) => None,
    };

    // Last completed output frame, shared with the viewer.
    let shared = Arc::new(Mutex::new(Frame::default()));

    let (host_tx, host_rx) = crossbeam_channel::unbounded();
    let (event_tx, event_rx) = crossbeam_channel::unbounded();

    let bridge = Bridge::new(config.clone(), FrameCapture::publishing(shared.clone()))?.with_events(event_tx);
    let bridge_thread = thread::spawn(move || run_bridge(bridge, host_rx));
    let host_thread = thread::spawn(move || run_host(config, host_tx, event_rx, frames));

    if args.headless {
        if host_thread.join().is_err() {
            error!("host thread panicked");
        }
        if bridge_thread.join().is_err() {
            error!("bridge thread panicked");
        }
    } else {
        run_viewer(shared.clone())?;
    }

    if let Some(path) = &args.screenshot {
        let frame = shared.lock().map(|f| f.clone()).unwrap_or_default();
        screenshot::save_png(path, &frame)?;
        info!(path = %path.display(), width = frame.width, height = frame.height, "screenshot saved");
    }
    Ok(())
}

fn run_bridge(mut bridge: Bridge<FrameCapture>, host_rx: Receiver<HostMessage>) {
    loop {
        match host_rx.recv_timeout(FRAME_PERIOD) {
            Ok(HostMessage::Trace(ops)) => {
                bridge.replay(&ops);
            }
            Ok(HostMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => bridge.run_frames(1),
        }
    }
    let stats = bridge.engine().stats();
    info!(
        vblanks = bridge.vblanks(),
        reads = stats.reads,
        writes = stats.writes,
        missed = stats.missed,
        underruns = bridge.chain().stats().underruns,
        "bridge stopped"
    );
}

/// Plays the driver side: set the card up, then scroll the display one
/// line per vblank.
fn run_host(config: BridgeConfig, tx: Sender<HostMessage>, events: Receiver<BridgeEvent>, frames: Option<u64>) {
    let base = config.io_base;
    if tx.send(HostMessage::Trace(trace::demo_setup(base, config.blit_command_addr()))).is_err() {
        return;
    }

    let scroll_range = (DEMO_ROWS - DEMO_HEIGHT) as u64;
    while let Ok(event) = events.recv() {
        match event {
            BridgeEvent::Vblank { frame, .. } => {
                if frames.is_some_and(|n| frame >= n) {
                    break;
                }
                let line = (frame % scroll_range) as u8;
                if tx.send(HostMessage::Trace(trace::scroll_step(base, line))).is_err() {
                    return;
                }
            }
            BridgeEvent::BlitComplete => info!("demo blit complete"),
        }
    }
    let _ = tx.send(HostMessage::Shutdown);
}

fn run_viewer(frame: Arc<Mutex<Frame>>) -> Result<(), BridgeError> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([820.0, 660.0])
            .with_title("ISA Video Bridge"),
        ..Default::default()
    };

    eframe::run_native(
        "isa-video-bridge",
        options,
        Box::new(move |_cc| {
            Ok(Box::new(ViewerApp {
                frame,
                texture: None,
            }))
        }),
    )?;
    Ok(())
}

struct ViewerApp {
    frame: Arc<Mutex<Frame>>,
    texture: Option<egui::TextureHandle>,
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let frame = match self.frame.lock() {
                Ok(f) => f.clone(),
                Err(_) => Frame::default(),
            };

            if frame.pixels.is_empty() {
                ui.label("waiting for first frame");
            } else {
                let image = egui::ColorImage::from_rgb([frame.width, frame.height], frame.as_rgb_bytes());
                match &mut self.texture {
                    Some(tex) => tex.set(image, egui::TextureOptions::NEAREST),
                    None => {
                        self.texture = Some(ctx.load_texture("screen", image, egui::TextureOptions::NEAREST));
                    }
                }
                if let Some(tex) = &self.texture {
                    ui.add(
                        egui::Image::from_texture(tex)
                            .fit_to_exact_size(egui::vec2(frame.width as f32, frame.height as f32)),
                    );
                }
            }
        });

        ctx.request_repaint();
    }
}
