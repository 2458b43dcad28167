//! Project Oberon workstation emulator binary.
//!
//! Runs the machine in a winit window with a pixels framebuffer, or in
//! headless mode for screenshots. Left Ctrl, Alt, and Super stand in for
//! the three-button mouse Oberon expects; F11 toggles fullscreen and F12
//! resets the machine.

use std::cell::RefCell;
use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use std::time::{Duration, Instant};

use emu_oberon::{
    capture, keyboard_map, rom, ClipboardBridge, ConsoleLeds, Disk, HostClipboard, MachineConfig,
    Oberon, PcLink, RawSerial, COLOR_BLACK, COLOR_WHITE, FRAMEBUFFER_HEIGHT, FRAMEBUFFER_WIDTH,
};
use pixels::{Pixels, SurfaceTexture};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, Window, WindowAttributes, WindowId};

/// The FPGA system clocks the CPU at 25 MHz.
const CPU_HZ: u32 = 25_000_000;
const FPS: u32 = 60;

/// Frame duration for the 60 Hz display.
const FRAME_DURATION: Duration = Duration::from_micros(16_667);

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

struct CliArgs {
    disk_image: Option<PathBuf>,
    rom_path: Option<PathBuf>,
    mem: u32,
    size: Option<(u32, u32)>,
    zoom: f64,
    fullscreen: bool,
    leds: bool,
    boot_from_serial: bool,
    serial_in: Option<PathBuf>,
    serial_out: Option<PathBuf>,
    headless: bool,
    frames: u32,
    screenshot_path: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        disk_image: None,
        rom_path: None,
        mem: 0,
        size: None,
        zoom: 0.0,
        fullscreen: false,
        leds: false,
        boot_from_serial: false,
        serial_in: None,
        serial_out: None,
        headless: false,
        frames: 200,
        screenshot_path: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--mem" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.mem = s.parse().unwrap_or(0);
                }
            }
            "--size" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    match parse_size(s) {
                        Some(size) => cli.size = Some(size),
                        None => {
                            eprintln!("Invalid size: {s} (expected WIDTHxHEIGHT)");
                            process::exit(1);
                        }
                    }
                }
            }
            "--zoom" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.zoom = s.parse().unwrap_or(0.0);
                }
            }
            "--rom" => {
                i += 1;
                cli.rom_path = args.get(i).map(PathBuf::from);
            }
            "--fullscreen" => {
                cli.fullscreen = true;
            }
            "--leds" => {
                cli.leds = true;
            }
            "--boot-from-serial" => {
                cli.boot_from_serial = true;
            }
            "--serial-in" => {
                i += 1;
                cli.serial_in = args.get(i).map(PathBuf::from);
            }
            "--serial-out" => {
                i += 1;
                cli.serial_out = args.get(i).map(PathBuf::from);
            }
            "--headless" => {
                cli.headless = true;
            }
            "--frames" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.frames = s.parse().unwrap_or(200);
                }
            }
            "--screenshot" => {
                i += 1;
                cli.screenshot_path = args.get(i).map(PathBuf::from);
            }
            "--help" | "-h" => {
                eprintln!("Usage: emu-oberon [OPTIONS] [disk-image]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --mem <MEGS>         Set memory size in megabytes (1-32)");
                eprintln!("  --size <WxH>         Set framebuffer size [default: 1024x768]");
                eprintln!("  --zoom <factor>      Scale the window by the given factor");
                eprintln!("  --fullscreen         Start in fullscreen mode");
                eprintln!("  --leds               Log LED state on stdout");
                eprintln!("  --rom <file>         Boot ROM image (2048 bytes, little-endian)");
                eprintln!("  --boot-from-serial   Boot from the serial line (no disk required)");
                eprintln!("  --serial-in <file>   Read serial input from file");
                eprintln!("  --serial-out <file>  Write serial output to file");
                eprintln!("  --headless           Run without a window");
                eprintln!("  --frames <n>         Frames to run in headless mode [default: 200]");
                eprintln!("  --screenshot <file>  Save a PNG screenshot (headless)");
                eprintln!();
                eprintln!("In the window, Left Ctrl/Alt/Super act as mouse buttons 1/2/3,");
                eprintln!("F11 toggles fullscreen, and F12 resets the machine.");
                process::exit(0);
            }
            other if !other.starts_with('-') && cli.disk_image.is_none() => {
                cli.disk_image = Some(PathBuf::from(other));
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    if cli.disk_image.is_none() && !cli.boot_from_serial {
        eprintln!("Missing disk image argument (or pass --boot-from-serial)");
        process::exit(1);
    }

    cli
}

fn parse_size(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

// ---------------------------------------------------------------------------
// Host clipboard
// ---------------------------------------------------------------------------

/// Session-local clipboard buffer shared between the guest channels.
///
/// The windowing layer exposes no clipboard API, so copy and paste work
/// within the emulator session rather than with the host desktop.
#[derive(Default)]
struct SessionClipboard(Rc<RefCell<String>>);

impl HostClipboard for SessionClipboard {
    fn get(&mut self) -> Result<String, Box<dyn Error>> {
        Ok(self.0.borrow().clone())
    }

    fn set(&mut self, text: &str) -> Result<(), Box<dyn Error>> {
        *self.0.borrow_mut() = text.to_string();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Machine assembly
// ---------------------------------------------------------------------------

fn make_machine(cli: &CliArgs) -> Oberon {
    let (width, height) = cli.size.unwrap_or((FRAMEBUFFER_WIDTH, FRAMEBUFFER_HEIGHT));
    let config = MachineConfig {
        megabytes: cli.mem,
        width,
        height,
    };
    let mut machine = Oberon::with_config(&config);

    if let Some(ref path) = cli.rom_path {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(err) => {
                eprintln!("Failed to read ROM file {}: {err}", path.display());
                process::exit(1);
            }
        };
        match rom::decode(&data) {
            Some(image) => machine.set_rom(image),
            None => {
                eprintln!(
                    "ROM file {} must be exactly 2048 bytes",
                    path.display()
                );
                process::exit(1);
            }
        }
    }

    if cli.serial_in.is_some() || cli.serial_out.is_some() {
        match RawSerial::open(cli.serial_in.as_deref(), cli.serial_out.as_deref()) {
            Ok(serial) => machine.set_serial(Box::new(serial)),
            Err(err) => {
                eprintln!("Can't open serial I/O: {err}");
                process::exit(1);
            }
        }
    } else {
        machine.set_serial(Box::new(PcLink::new()));
    }

    machine.set_clipboard(Box::new(ClipboardBridge::new(Box::new(
        SessionClipboard::default(),
    ))));

    if cli.leds {
        machine.set_leds(Box::new(ConsoleLeds));
    }

    if cli.boot_from_serial {
        machine.set_switches(1);
    }

    if let Some(ref path) = cli.disk_image {
        match Disk::open(path) {
            Ok(disk) => machine.set_spi(1, Box::new(disk)),
            Err(err) => {
                eprintln!("Can't open disk image {}: {err}", path.display());
                process::exit(1);
            }
        }
    }

    machine
}

// ---------------------------------------------------------------------------
// Headless mode
// ---------------------------------------------------------------------------

fn run_headless(cli: &CliArgs) {
    let mut machine = make_machine(cli);

    for frame in 0..cli.frames {
        machine.set_time(frame * 1000 / FPS);
        if let Err(fault) = machine.run(CPU_HZ / FPS) {
            eprintln!("{fault}");
        }
    }

    if let Some(ref path) = cli.screenshot_path {
        if let Err(err) = capture::save_screenshot(&machine, path) {
            eprintln!("Screenshot error: {err}");
            process::exit(1);
        }
        eprintln!("Screenshot saved to {}", path.display());
    }
}

// ---------------------------------------------------------------------------
// Windowed mode (winit + pixels)
// ---------------------------------------------------------------------------

struct App {
    machine: Oberon,
    fb_width: u32,
    fb_height: u32,
    window: Option<&'static Window>,
    pixels: Option<Pixels<'static>>,
    start: Instant,
    last_frame_time: Instant,
    zoom: f64,
    fullscreen: bool,
    left_shift: bool,
    right_shift: bool,
}

impl App {
    fn new(machine: Oberon, cli: &CliArgs) -> Self {
        let fb = machine.framebuffer();
        let (fb_width, fb_height) = (fb.width(), fb.height());
        Self {
            machine,
            fb_width,
            fb_height,
            window: None,
            pixels: None,
            start: Instant::now(),
            last_frame_time: Instant::now(),
            zoom: cli.zoom,
            fullscreen: cli.fullscreen,
            left_shift: false,
            right_shift: false,
        }
    }

    fn handle_key(&mut self, keycode: KeyCode, pressed: bool) {
        match keycode {
            // Machine reset
            KeyCode::F12 => {
                if pressed {
                    self.machine.reset();
                }
            }
            KeyCode::F11 => {
                if pressed {
                    self.toggle_fullscreen();
                }
            }
            // The left modifiers stand in for the three-button mouse.
            KeyCode::ControlLeft => self.machine.mouse_button(1, pressed),
            KeyCode::AltLeft => self.machine.mouse_button(2, pressed),
            KeyCode::SuperLeft => self.machine.mouse_button(3, pressed),
            _ => {
                if keycode == KeyCode::ShiftLeft {
                    self.left_shift = pressed;
                } else if keycode == KeyCode::ShiftRight {
                    self.right_shift = pressed;
                }
                let ps2 =
                    keyboard_map::encode(keycode, pressed, self.left_shift, self.right_shift);
                self.machine.keyboard_input(&ps2);
            }
        }
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(window) = self.window {
            self.fullscreen = !self.fullscreen;
            window.set_fullscreen(if self.fullscreen {
                Some(Fullscreen::Borderless(None))
            } else {
                None
            });
        }
    }

    /// Repaint the damaged cell rectangle into the RGBA frame.
    ///
    /// Display word rows are bottom-up, so row `r` lands on output line
    /// `height - r - 1`.
    fn update_pixels(&mut self) {
        let Some(pixels) = self.pixels.as_mut() else {
            return;
        };

        let damage = self.machine.take_framebuffer_damage();
        if damage.is_empty() {
            return;
        }

        let fb = self.machine.framebuffer();
        let width = fb.width();
        let height = fb.height();
        let frame = pixels.frame_mut();

        for row in damage.min_y..=damage.max_y {
            let y_out = height - row - 1;
            for col in damage.min_x..=damage.max_x {
                let mut word = fb.word(row, col);
                for bit in 0..32 {
                    let x = col * 32 + bit;
                    let argb = if word & 1 != 0 {
                        COLOR_WHITE
                    } else {
                        COLOR_BLACK
                    };
                    let offset = ((y_out * width + x) * 4) as usize;
                    frame[offset] = (argb >> 16) as u8; // R
                    frame[offset + 1] = (argb >> 8) as u8; // G
                    frame[offset + 2] = argb as u8; // B
                    frame[offset + 3] = 0xFF; // A
                    word >>= 1;
                }
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return; // Already created
        }

        // Default zoom: 2x when the monitor has room, else 1x.
        if self.zoom <= 0.0 {
            self.zoom = match event_loop.primary_monitor() {
                Some(monitor)
                    if monitor.size().width >= self.fb_width * 2
                        && monitor.size().height >= self.fb_height * 2 =>
                {
                    2.0
                }
                _ => 1.0,
            };
        }

        let window_size = winit::dpi::LogicalSize::new(
            f64::from(self.fb_width) * self.zoom,
            f64::from(self.fb_height) * self.zoom,
        );
        let mut attrs = WindowAttributes::default()
            .with_title("Project Oberon")
            .with_inner_size(window_size);
        if self.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        match event_loop.create_window(attrs) {
            Ok(window) => {
                // Leak the window to get a 'static reference. Intentional:
                // it lives for the whole application and the OS reclaims it
                // on process exit.
                let window: &'static Window = Box::leak(Box::new(window));
                let inner = window.inner_size();
                let surface = SurfaceTexture::new(inner.width, inner.height, window);
                match Pixels::new(self.fb_width, self.fb_height, surface) {
                    Ok(pixels) => {
                        self.pixels = Some(pixels);
                    }
                    Err(err) => {
                        eprintln!("Failed to create pixels: {err}");
                        event_loop.exit();
                        return;
                    }
                }
                self.window = Some(window);
            }
            Err(err) => {
                eprintln!("Failed to create window: {err}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(pixels) = self.pixels.as_mut() {
                    if let Err(err) = pixels.resize_surface(size.width, size.height) {
                        eprintln!("Resize error: {err}");
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(pixels) = self.pixels.as_ref() {
                    let pos = (position.x as f32, position.y as f32);
                    let (x, y) = pixels
                        .window_pos_to_pixel(pos)
                        .unwrap_or_else(|p| pixels.clamp_pixel_pos(p));
                    // The guest's origin is bottom left.
                    self.machine
                        .mouse_moved(x as i32, self.fb_height as i32 - y as i32 - 1);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let down = state == ElementState::Pressed;
                match button {
                    MouseButton::Left => self.machine.mouse_button(1, down),
                    MouseButton::Middle => self.machine.mouse_button(2, down),
                    MouseButton::Right => self.machine.mouse_button(3, down),
                    _ => {}
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(keycode) = event.physical_key {
                    self.handle_key(keycode, event.state == ElementState::Pressed);
                }
            }
            WindowEvent::RedrawRequested => {
                // Throttle to ~60 Hz
                let now = Instant::now();
                if now.duration_since(self.last_frame_time) >= FRAME_DURATION {
                    self.machine.set_time(self.start.elapsed().as_millis() as u32);
                    if let Err(fault) = self.machine.run(CPU_HZ / FPS) {
                        // The machine has reset itself; render the last
                        // frame and keep going.
                        eprintln!("{fault}");
                    }
                    self.update_pixels();
                    self.last_frame_time = now;
                }

                if let Some(pixels) = self.pixels.as_ref() {
                    if let Err(err) = pixels.render() {
                        eprintln!("Render error: {err}");
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window {
            window.request_redraw();
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    let cli = parse_args();

    if cli.headless {
        run_headless(&cli);
        return;
    }

    let machine = make_machine(&cli);
    let mut app = App::new(machine, &cli);

    let event_loop = match EventLoop::new() {
        Ok(el) => el,
        Err(err) => {
            eprintln!("Failed to create event loop: {err}");
            process::exit(1);
        }
    };

    if let Err(err) = event_loop.run_app(&mut app) {
        eprintln!("Event loop error: {err}");
        process::exit(1);
    }
}
