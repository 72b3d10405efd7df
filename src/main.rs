//! First-person demo: walk a squishy player around the built-in room and
//! shoot two linked portals onto its walls.
//!
//! Controls  W/S/A/D walk · Space jump · mouse aim · LMB/RMB fire portal
//!           B throw a blob · 1/2 narrow/widen FOV · T toggle mouse · Q/Esc quit
//!
//! Build:  cargo run --release -- --use-framebuffer

use clap::Parser;
use glam::{DVec2, DVec3};
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};
use std::time::{Duration, Instant};

use portal_blob::{
    Settings, logging,
    renderer::{Gpu, PortalSystem, Rgba, Software, TextureId, portal_corners},
    sim::{BlobActor, Body, Signal, TicRunner},
    world::{Actor, PortalSlot, ViewerId, demo_room},
};

const WHITE: Rgba = 0xFF_FFFFFF;
const PLAYER_COLOUR: Rgba = 0xFF_E0C040;
const BLOB_COLOUR: Rgba = 0xFF_40C060;
const MARKER_COLOUR: Rgba = 0xFF_C04040;
const WALL_TEXTURE_SIZE: usize = 64;

/// Blob physics and portal view synthesis demo
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Vertical field of view in degrees (65‥110)
    #[arg(long, default_value_t = 90.0)]
    fov: f64,

    /// Degrees of aim per pixel of mouse travel
    #[arg(long, default_value_t = 0.35)]
    sensitivity: f64,

    /// Capture portal views with off-screen framebuffers
    #[arg(long)]
    use_framebuffer: bool,

    #[arg(long, default_value_t = 1024)]
    width: usize,

    #[arg(long, default_value_t = 576)]
    height: usize,

    /// Largest side of a portal's off-screen image
    #[arg(long, default_value_t = 128)]
    portal_resolution: usize,

    /// Start without mouse aiming (toggle with T)
    #[arg(long)]
    no_mouse: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl From<Cli> for Settings {
    fn from(cli: Cli) -> Self {
        Self {
            fov: portal_blob::config::clamp_fov(cli.fov),
            mouse_sensitivity: cli.sensitivity,
            use_framebuffer: cli.use_framebuffer,
            width: cli.width.max(1),
            height: cli.height.max(1),
            portal_resolution_cap: cli.portal_resolution.max(1),
            capture_mouse: !cli.no_mouse,
            verbose: cli.verbose,
            ..Settings::default()
        }
    }
}

/// Rising-edge detector for mouse buttons.
#[derive(Default)]
struct Clicks {
    left: bool,
    right: bool,
}

impl Clicks {
    /// Which portal slots were fired this frame.
    fn poll(&mut self, win: &Window) -> [Option<PortalSlot>; 2] {
        let (left, right) = (
            win.get_mouse_down(MouseButton::Left),
            win.get_mouse_down(MouseButton::Right),
        );
        let fired = [
            (left && !self.left).then_some(PortalSlot::Second),
            (right && !self.right).then_some(PortalSlot::First),
        ];
        self.left = left;
        self.right = right;
        fired
    }
}

fn main() -> anyhow::Result<()> {
    let mut settings = Settings::from(Cli::parse());
    logging::init(settings.verbose);

    let level = demo_room();
    let mut gpu = Software::new(settings.width, settings.height);
    let wall_texture = upload_wall_texture(&mut gpu)?;

    let mut portals = PortalSystem::new(&mut gpu, &settings, [Actor::default(); 2])?;
    // start with one portal on the west wall and one on the north wall
    let openers = [
        (PortalSlot::First, Actor::new(DVec3::new(5.0, 2.0, 4.0), -DVec3::X, DVec3::Y)),
        (PortalSlot::Second, Actor::new(DVec3::new(5.0, 2.0, 5.0), -DVec3::Z, DVec3::Y)),
    ];
    for (slot, shooter) in openers {
        portals.fire_portal(slot, &shooter, level);
    }

    let mut sim = TicRunner::new(BlobActor::player());

    let mut win = Window::new(
        "Portal blobs",
        settings.width,
        settings.height,
        WindowOptions {
            resize: true,
            ..WindowOptions::default()
        },
    )?;
    win.set_target_fps(60);

    let mut clicks = Clicks::default();
    let mut last_mouse: Option<(f32, f32)> = None;

    // ────────────────── benchmarking state ──────────────────────────────
    let mut acc_time = Duration::ZERO;
    let mut acc_frames = 0usize;
    let mut last_print = Instant::now();

    while win.is_open() && !win.is_key_down(Key::Escape) && !win.is_key_down(Key::Q) {
        let t0 = Instant::now();

        /* movement --------------------------------------------------------- */
        const WALK: [(Key, f64); 4] = [(Key::W, 0.0), (Key::S, 180.0), (Key::A, -90.0), (Key::D, 90.0)];
        for (key, angle) in WALK {
            if win.is_key_down(key) {
                sim.player.movement_signal(Signal::Push { angle });
            }
        }
        if win.is_key_down(Key::Space) {
            sim.player.movement_signal(Signal::Jump);
        }

        /* aiming ------------------------------------------------------------ */
        if win.is_key_pressed(Key::T, KeyRepeat::No) {
            settings.capture_mouse = !settings.capture_mouse;
            last_mouse = None;
            log::info!("mouse aim {}", if settings.capture_mouse { "on" } else { "off" });
        }
        if settings.capture_mouse {
            if let Some((x, y)) = win.get_mouse_pos(MouseMode::Pass) {
                if let Some((lx, ly)) = last_mouse {
                    let (yaw, pitch) = settings.aim((x - lx) as f64, (y - ly) as f64);
                    if yaw != 0.0 || pitch != 0.0 {
                        sim.player.movement_signal(Signal::Aim { yaw, pitch });
                    }
                }
                last_mouse = Some((x, y));
            }
        }

        /* actions ----------------------------------------------------------- */
        let eye = sim.player.actor;
        for slot in clicks.poll(&win).into_iter().flatten() {
            portals.fire_portal(slot, &eye, level);
        }
        if win.is_key_pressed(Key::B, KeyRepeat::No) {
            sim.spawn_blob();
        }
        if win.is_key_pressed(Key::Key1, KeyRepeat::Yes) {
            settings.adjust_fov(-1.0);
        }
        if win.is_key_pressed(Key::Key2, KeyRepeat::Yes) {
            settings.adjust_fov(1.0);
        }

        sim.tick(level);

        /* draw -------------------------------------------------------------- */
        let (w, h) = win.get_size();
        let (w, h) = (w.max(1), h.max(1));
        gpu.resize(w, h);

        let mut draw_world = |gpu: &mut Software, viewer: ViewerId| {
            draw_scene(gpu, viewer, &sim, &portals, wall_texture)
        };
        portals.render_frame(&mut gpu, &sim.player, settings.fov, (w, h), &mut draw_world)?;

        gpu.present(|fb, w, h| {
            acc_time += t0.elapsed();
            acc_frames += 1;
            win.update_with_buffer(fb, w, h)
        })?;

        if last_print.elapsed() >= Duration::from_secs(3) {
            let avg_ms = acc_time.as_secs_f64() * 1000.0 / acc_frames as f64;
            log::debug!(
                "avg frame: {:.2} ms ({:.1} FPS), {} bodies",
                avg_ms,
                1000.0 / avg_ms,
                sim.bodies().len()
            );
            acc_time = Duration::ZERO;
            acc_frames = 0;
            last_print = Instant::now();
        }
    }
    Ok(())
}

/// Everything visible from `viewer`, minus the viewer itself.
fn draw_scene(
    gpu: &mut Software,
    viewer: ViewerId,
    sim: &TicRunner,
    portals: &PortalSystem,
    wall_texture: TextureId,
) {
    gpu.bind_texture(Some(wall_texture));
    for wall in demo_room().walls() {
        let (w, h) = wall.extent();
        let uvs = [
            DVec2::new(0.0, 0.0),
            DVec2::new(0.0, h),
            DVec2::new(w, h),
            DVec2::new(w, 0.0),
        ];
        gpu.draw_quad(&wall.corners, &uvs, WHITE);
    }
    gpu.bind_texture(None);

    if viewer != ViewerId::Player {
        let p = &sim.player;
        gpu.draw_ellipsoid(p.position() - p.center, p.fatness, PLAYER_COLOUR);
    }

    for body in sim.bodies() {
        match body {
            Body::Blob(blob) => {
                gpu.draw_ellipsoid(blob.position() - blob.center, blob.fatness, BLOB_COLOUR)
            }
            Body::Static(actor) => gpu.draw_ellipsoid(actor.position, DVec3::splat(0.1), MARKER_COLOUR),
        }
    }

    for slot in PortalSlot::ALL {
        if viewer == ViewerId::Portal(slot) {
            continue;
        }
        let (corners, uvs) = portal_corners(portals.portal(slot));
        gpu.bind_texture(Some(portals.texture(slot)));
        gpu.draw_quad(&corners, &uvs, WHITE);
    }
    gpu.bind_texture(None);
}

/// Grey brick pattern, one texture repeat per world unit.
fn upload_wall_texture(gpu: &mut Software) -> anyhow::Result<TextureId> {
    const N: usize = WALL_TEXTURE_SIZE;
    let mut pixels = vec![0; N * N];
    for y in 0..N {
        for x in 0..N {
            let row = y / (N / 4);
            let shift = if row % 2 == 0 { 0 } else { N / 4 };
            let mortar = y % (N / 4) == 0 || (x + shift) % (N / 2) == 0;
            let shade: u32 = if mortar { 0x50 } else { 0x90 + ((x ^ y) & 0x0F) as u32 };
            pixels[y * N + x] = 0xFF00_0000 | shade << 16 | shade << 8 | shade;
        }
    }

    let id = gpu.create_texture(N, N);
    gpu.bind_texture(Some(id));
    gpu.upload_texture(N, N, &pixels);
    gpu.generate_mipmaps();
    gpu.bind_texture(None);
    portal_blob::renderer::check(gpu, "wall texture upload")?;
    Ok(id)
}
