//! Top-level Oberon workstation: CPU, memory, display, and I/O routing.
//!
//! The memory layout differs slightly from the FPGA implementation: the
//! FPGA has a 20-bit address bus and ignores the top 12 bits, while we use
//! all 32 bits. In the default configuration the emulator is compatible
//! with the FPGA system; when the user requests more RAM the framebuffer is
//! moved up to make room for a larger Oberon heap, which requires a custom
//! Display.Mod on the guest side.
//!
//! # Frame loop
//!
//! The host frontend drives the machine once per display frame: feed the
//! wall-clock millisecond with [`Oberon::set_time`], inject input, execute a
//! slice with [`Oberon::run`], then repaint whatever
//! [`Oberon::take_framebuffer_damage`] reports.

use std::collections::VecDeque;

use cpu_risc5::{Bus, Fault, Risc5, ROM_START, ROM_WORDS};

use crate::config::MachineConfig;
use crate::framebuffer::{DamageTracker, Framebuffer, Rect};
use crate::io::{Clipboard, Led, Serial, Spi};
use crate::rom;

/// Stock display size of the FPGA system.
pub const FRAMEBUFFER_WIDTH: u32 = 1024;
pub const FRAMEBUFFER_HEIGHT: u32 = 768;

const DEFAULT_MEM_SIZE: u32 = 0x0010_0000; // 1 MiB
const DEFAULT_DISPLAY_START: u32 = 0x000E_7F00;

const IO_START: u32 = 0xFFFF_FFC0;

/// Marker written at the default display start so the guest's display
/// driver can find a relocated framebuffer ("Sizg").
const SIZE_MAGIC: u32 = 0x5369_7A67;

/// How many idle I/O polls a `run` call tolerates before yielding.
///
/// Reading the millisecond counter or polling an empty keyboard decrements
/// this; Oberon's idle loop does both, so a depleted count means the guest
/// is just waiting for the next tick and emulation can pause until the next
/// frame.
const PROGRESS_BUDGET: u32 = 20;

/// The Project Oberon RISC workstation.
pub struct Oberon {
    cpu: Risc5,
    bus: OberonBus,
}

impl Oberon {
    /// Create a machine with the stock FPGA-compatible layout.
    #[must_use]
    pub fn new() -> Self {
        let columns = FRAMEBUFFER_WIDTH / 32;
        let mut machine = Self {
            cpu: Risc5::new(),
            bus: OberonBus {
                mem: vec![0; (DEFAULT_MEM_SIZE / 4) as usize],
                rom: rom::BOOTLOADER,
                display_start: DEFAULT_DISPLAY_START,
                width: FRAMEBUFFER_WIDTH,
                height: FRAMEBUFFER_HEIGHT,
                damage: DamageTracker::new(columns, FRAMEBUFFER_HEIGHT),
                progress: 0,
                millisecond_counter: 0,
                mouse: 0,
                key_buf: VecDeque::new(),
                switches: 0,
                spi_selected: 0,
                leds: None,
                serial: None,
                spi: [None, None, None, None],
                clipboard: None,
            },
        };
        machine.reset();
        machine
    }

    /// Create a machine from a configuration, reshaping memory if it is not
    /// the stock layout.
    #[must_use]
    pub fn with_config(config: &MachineConfig) -> Self {
        let mut machine = Self::new();
        let config = config.normalized();
        if !config.is_default() {
            machine.configure_memory(config.megabytes.max(1), config.width, config.height);
        }
        machine
    }

    /// Reshape RAM and the display, then reset.
    ///
    /// `megabytes` is clamped to 1..=32 and `width` to a multiple of 32.
    /// The framebuffer moves to the top of RAM; the bootloader words that
    /// encode the memory limit and stack origin are patched, and a
    /// four-word header is left at the default display start so the guest
    /// display driver can locate the framebuffer.
    pub fn configure_memory(&mut self, megabytes: u32, width: u32, height: u32) {
        let megabytes = megabytes.clamp(1, 32);
        let width = width & !31;

        let display_start = megabytes << 20;
        let columns = width / 32;
        let mem_size = display_start + width * height / 8;

        self.bus.display_start = display_start;
        self.bus.width = width;
        self.bus.height = height;
        self.bus.damage = DamageTracker::new(columns, height);
        self.bus.mem = vec![0; (mem_size / 4) as usize];

        // Patch the layout constants in the bootloader.
        let mem_lim = display_start - 16;
        self.bus.rom[rom::PATCH_MEM_LIMIT_HI] = 0x6100_0000 + (mem_lim >> 16);
        self.bus.rom[rom::PATCH_MEM_LIMIT_LO] = 0x4116_0000 + (mem_lim & 0x0000_FFFF);
        let stack_org = display_start / 2;
        self.bus.rom[rom::PATCH_STACK_ORG_HI] = 0x6100_0000 + (stack_org >> 16);

        // Inform the display driver of the framebuffer layout. Not a pretty
        // mechanism, but disk images written this way still boot on the
        // standard FPGA system.
        let header = (DEFAULT_DISPLAY_START / 4) as usize;
        self.bus.mem[header] = SIZE_MAGIC;
        self.bus.mem[header + 1] = width;
        self.bus.mem[header + 2] = height;
        self.bus.mem[header + 3] = display_start;

        self.reset();
    }

    /// Replace the boot ROM image.
    pub fn set_rom(&mut self, image: [u32; ROM_WORDS]) {
        self.bus.rom = image;
    }

    /// Attach the LED observer.
    pub fn set_leds(&mut self, leds: Box<dyn Led>) {
        self.bus.leds = Some(leds);
    }

    /// Attach the serial peripheral.
    pub fn set_serial(&mut self, serial: Box<dyn Serial>) {
        self.bus.serial = Some(serial);
    }

    /// Attach an SPI device. Slot 1 is the disk, slot 2 the optional
    /// network; other slots are ignored.
    pub fn set_spi(&mut self, index: usize, spi: Box<dyn Spi>) {
        if index == 1 || index == 2 {
            self.bus.spi[index] = Some(spi);
        }
    }

    /// Attach the clipboard peripheral.
    pub fn set_clipboard(&mut self, clipboard: Box<dyn Clipboard>) {
        self.bus.clipboard = Some(clipboard);
    }

    /// Latch the switch register; value 1 requests serial boot.
    pub fn set_switches(&mut self, switches: u32) {
        self.bus.switches = switches;
    }

    /// Feed the wall-clock millisecond counter. Call once per frame, before
    /// [`run`](Self::run).
    pub fn set_time(&mut self, millis: u32) {
        self.bus.millisecond_counter = millis;
    }

    /// Move the mouse. Coordinates are clamped to the 12-bit fields of the
    /// mouse word; the origin is bottom left.
    pub fn mouse_moved(&mut self, x: i32, y: i32) {
        if (0..=0xFFF).contains(&x) {
            self.bus.mouse = (self.bus.mouse & !0x0000_0FFF) | x as u32;
        }
        if (0..=0xFFF).contains(&y) {
            self.bus.mouse = (self.bus.mouse & !0x00FF_F000) | ((y as u32) << 12);
        }
    }

    /// Press or release a mouse button (1, 2, or 3).
    pub fn mouse_button(&mut self, button: u32, down: bool) {
        if !(1..=3).contains(&button) {
            return;
        }
        let bit = 1 << (27 - button);
        if down {
            self.bus.mouse |= bit;
        } else {
            self.bus.mouse &= !bit;
        }
    }

    /// Append PS/2 scancodes to the keyboard queue. The host produces the
    /// byte sequences (see `keyboard_map`).
    pub fn keyboard_input(&mut self, ps2_commands: &[u8]) {
        self.bus.key_buf.extend(ps2_commands);
    }

    /// Reset the CPU to the boot ROM entry point.
    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    /// Execute up to `cycles` instructions.
    ///
    /// Returns early when the guest is detected busy-waiting for the next
    /// millisecond tick or key (see [`PROGRESS_BUDGET`]).
    ///
    /// # Errors
    ///
    /// A [`Fault`] is returned when the CPU branches outside RAM and ROM;
    /// the machine resets so the next `run` starts from the bootloader.
    pub fn run(&mut self, cycles: u32) -> Result<(), Fault> {
        self.bus.progress = PROGRESS_BUDGET;
        for _ in 0..cycles {
            if self.bus.progress == 0 {
                break;
            }
            if let Err(fault) = self.cpu.step(&mut self.bus) {
                self.reset();
                return Err(fault);
            }
        }
        Ok(())
    }

    /// View of the display bits.
    #[must_use]
    pub fn framebuffer(&self) -> Framebuffer<'_> {
        let start = (self.bus.display_start / 4) as usize;
        Framebuffer::new(self.bus.width, self.bus.height, &self.bus.mem[start..])
    }

    /// The damage rectangle accumulated since the last call, reset to empty.
    pub fn take_framebuffer_damage(&mut self) -> Rect {
        self.bus.damage.take()
    }

    /// Reference to the CPU.
    #[must_use]
    pub fn cpu(&self) -> &Risc5 {
        &self.cpu
    }

    /// Mutable reference to the CPU.
    pub fn cpu_mut(&mut self) -> &mut Risc5 {
        &mut self.cpu
    }

    /// Reference to the bus.
    #[must_use]
    pub fn bus(&self) -> &OberonBus {
        &self.bus
    }

    /// Mutable reference to the bus.
    pub fn bus_mut(&mut self) -> &mut OberonBus {
        &mut self.bus
    }
}

impl Default for Oberon {
    fn default() -> Self {
        Self::new()
    }
}

/// The machine bus: RAM, boot ROM, framebuffer, and memory-mapped I/O.
pub struct OberonBus {
    /// RAM, as 32-bit words. Display memory lives at `display_start`.
    pub mem: Vec<u32>,
    rom: [u32; ROM_WORDS],
    display_start: u32,
    width: u32,
    height: u32,
    damage: DamageTracker,
    progress: u32,
    millisecond_counter: u32,
    mouse: u32,
    key_buf: VecDeque<u8>,
    switches: u32,
    spi_selected: u32,
    leds: Option<Box<dyn Led>>,
    serial: Option<Box<dyn Serial>>,
    spi: [Option<Box<dyn Spi>>; 4],
    clipboard: Option<Box<dyn Clipboard>>,
}

impl OberonBus {
    /// Byte address one past the end of RAM.
    fn mem_size(&self) -> u32 {
        (self.mem.len() * 4) as u32
    }

    fn load_io(&mut self, address: u32) -> u32 {
        match address.wrapping_sub(IO_START) {
            0 => {
                // Millisecond counter
                self.progress = self.progress.wrapping_sub(1);
                self.millisecond_counter
            }
            4 => self.switches,
            8 => match &mut self.serial {
                Some(serial) => serial.read_data(),
                None => 0,
            },
            12 => match &mut self.serial {
                Some(serial) => serial.read_status(),
                None => 0,
            },
            16 => match &mut self.spi[self.spi_selected as usize] {
                Some(spi) => spi.read_data(),
                None => 255,
            },
            20 => {
                // SPI status. Bit 0: rx ready. Other bits unused.
                1
            }
            24 => {
                // Mouse input / keyboard status
                let mut mouse = self.mouse;
                if self.key_buf.is_empty() {
                    self.progress = self.progress.wrapping_sub(1);
                } else {
                    mouse |= 0x1000_0000;
                }
                mouse
            }
            28 => {
                // Keyboard data (PS/2)
                match self.key_buf.pop_front() {
                    Some(scancode) => u32::from(scancode),
                    None => 0,
                }
            }
            40 => match &mut self.clipboard {
                Some(clipboard) => clipboard.read_control(),
                None => 0,
            },
            44 => match &mut self.clipboard {
                Some(clipboard) => clipboard.read_data(),
                None => 0,
            },
            _ => 0,
        }
    }

    fn store_io(&mut self, address: u32, value: u32) {
        match address.wrapping_sub(IO_START) {
            4 => {
                if let Some(leds) = &mut self.leds {
                    leds.write(value);
                }
            }
            8 => {
                if let Some(serial) = &mut self.serial {
                    serial.write_data(value);
                }
            }
            16 => {
                if let Some(spi) = &mut self.spi[self.spi_selected as usize] {
                    spi.write_data(value);
                }
            }
            20 => {
                // SPI control. Bits 0-1: chip select. Bit 2: fast mode.
                // Bit 3: network enable. Other bits unused.
                self.spi_selected = value & 0b0011;
            }
            40 => {
                if let Some(clipboard) = &mut self.clipboard {
                    clipboard.write_control(value);
                }
            }
            44 => {
                if let Some(clipboard) = &mut self.clipboard {
                    clipboard.write_data(value);
                }
            }
            _ => {}
        }
    }
}

impl Bus for OberonBus {
    fn fetch(&mut self, pc: u32) -> Option<u32> {
        if (pc as usize) < self.mem.len() {
            Some(self.mem[pc as usize])
        } else if (ROM_START / 4..ROM_START / 4 + ROM_WORDS as u32).contains(&pc) {
            Some(self.rom[(pc - ROM_START / 4) as usize])
        } else {
            None
        }
    }

    fn load_word(&mut self, address: u32) -> u32 {
        if address < self.mem_size() {
            self.mem[(address / 4) as usize]
        } else {
            self.load_io(address)
        }
    }

    fn load_byte(&mut self, address: u32) -> u8 {
        (self.load_word(address) >> (address % 4 * 8)) as u8
    }

    fn store_word(&mut self, address: u32, value: u32) {
        if address < self.display_start {
            self.mem[(address / 4) as usize] = value;
        } else if address < self.mem_size() {
            self.mem[(address / 4) as usize] = value;
            self.damage
                .note_store(address / 4 - self.display_start / 4);
        } else {
            self.store_io(address, value);
        }
    }

    fn store_byte(&mut self, address: u32, value: u8) {
        if address < self.mem_size() {
            let shift = (address & 3) * 8;
            let w = (self.load_word(address) & !(0xFF << shift)) | (u32::from(value) << shift);
            self.store_word(address, w);
        } else {
            self.store_io(address, u32::from(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_store_load_round_trip() {
        let mut machine = Oberon::new();
        machine.bus_mut().store_word(0x1000, 0xDEAD_BEEF);
        assert_eq!(machine.bus_mut().load_word(0x1000), 0xDEAD_BEEF);
    }

    #[test]
    fn byte_store_load_round_trip() {
        let mut machine = Oberon::new();
        for offset in 0..4 {
            machine.bus_mut().store_byte(0x1000 + offset, 0xA0 + offset as u8);
        }
        for offset in 0..4 {
            assert_eq!(
                machine.bus_mut().load_byte(0x1000 + offset),
                0xA0 + offset as u8
            );
        }
    }

    #[test]
    fn ram_stores_do_not_mark_damage() {
        let mut machine = Oberon::new();
        machine.take_framebuffer_damage(); // clear the initial full-screen rect
        machine.bus_mut().store_word(0x1000, 1);
        assert!(machine.take_framebuffer_damage().is_empty());
    }

    #[test]
    fn framebuffer_store_marks_damage() {
        let mut machine = Oberon::new();
        machine.take_framebuffer_damage();
        machine.bus_mut().store_word(DEFAULT_DISPLAY_START + 4, 0xFFFF_FFFF);
        let rect = machine.take_framebuffer_damage();
        // Word 1 of display memory: bottom row (row 0), column 1.
        assert_eq!(
            rect,
            Rect {
                min_x: 1,
                min_y: 0,
                max_x: 1,
                max_y: 0
            }
        );
        assert!(machine.take_framebuffer_damage().is_empty());
    }

    #[test]
    fn fetch_serves_ram_and_rom_only() {
        let mut machine = Oberon::new();
        assert!(machine.bus_mut().fetch(0).is_some());
        assert_eq!(machine.bus_mut().fetch(ROM_START / 4), Some(0x4000_0000));
        assert!(machine.bus_mut().fetch(0x0100_0000).is_none());
    }

    #[test]
    fn millisecond_counter_readable() {
        let mut machine = Oberon::new();
        machine.set_time(12_345);
        assert_eq!(machine.bus_mut().load_word(IO_START), 12_345);
    }

    #[test]
    fn switches_latch() {
        let mut machine = Oberon::new();
        machine.set_switches(1);
        assert_eq!(machine.bus_mut().load_word(IO_START + 4), 1);
    }

    #[test]
    fn keyboard_queue_via_io() {
        let mut machine = Oberon::new();
        assert_eq!(machine.bus_mut().load_word(IO_START + 24) & 0x1000_0000, 0);

        machine.keyboard_input(&[0xAA, 0xF0, 0x1C]);
        assert_ne!(machine.bus_mut().load_word(IO_START + 24) & 0x1000_0000, 0);
        assert_eq!(machine.bus_mut().load_word(IO_START + 28), 0xAA);
        assert_eq!(machine.bus_mut().load_word(IO_START + 28), 0xF0);
        assert_eq!(machine.bus_mut().load_word(IO_START + 28), 0x1C);
        assert_eq!(machine.bus_mut().load_word(IO_START + 28), 0);
    }

    #[test]
    fn mouse_word_layout() {
        let mut machine = Oberon::new();
        machine.mouse_moved(100, 200);
        machine.mouse_button(1, true);
        let mouse = machine.bus_mut().load_word(IO_START + 24);
        assert_eq!(mouse & 0xFFF, 100);
        assert_eq!((mouse >> 12) & 0xFFF, 200);
        assert_ne!(mouse & (1 << 26), 0);

        machine.mouse_button(1, false);
        machine.mouse_button(3, true);
        let mouse = machine.bus_mut().load_word(IO_START + 24);
        assert_eq!(mouse & (1 << 26), 0);
        assert_ne!(mouse & (1 << 24), 0);

        // Out-of-range coordinates leave the fields untouched.
        machine.mouse_moved(-5, 0x2000);
        let mouse = machine.bus_mut().load_word(IO_START + 24);
        assert_eq!(mouse & 0xFFF, 100);
        assert_eq!((mouse >> 12) & 0xFFF, 200);
    }

    #[test]
    fn led_writes_reach_the_sink() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Recorder(Rc<RefCell<Vec<u32>>>);
        impl Led for Recorder {
            fn write(&mut self, value: u32) {
                self.0.borrow_mut().push(value);
            }
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut machine = Oberon::new();
        machine.set_leds(Box::new(Recorder(seen.clone())));
        machine.bus_mut().store_word(IO_START + 4, 0x85);
        assert_eq!(*seen.borrow(), vec![0x85]);
    }

    #[test]
    fn spi_chip_select_routes_devices() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Probe(Rc<RefCell<Vec<u32>>>, u32);
        impl Spi for Probe {
            fn read_data(&mut self) -> u32 {
                self.1
            }
            fn write_data(&mut self, value: u32) {
                self.0.borrow_mut().push(value);
            }
        }

        let disk_writes = Rc::new(RefCell::new(Vec::new()));
        let net_writes = Rc::new(RefCell::new(Vec::new()));
        let mut machine = Oberon::new();
        machine.set_spi(1, Box::new(Probe(disk_writes.clone(), 11)));
        machine.set_spi(2, Box::new(Probe(net_writes.clone(), 22)));

        // Slot 0 is unattached: reads float high.
        assert_eq!(machine.bus_mut().load_word(IO_START + 16), 255);

        machine.bus_mut().store_word(IO_START + 20, 1);
        machine.bus_mut().store_word(IO_START + 16, 0xAB);
        assert_eq!(machine.bus_mut().load_word(IO_START + 16), 11);

        machine.bus_mut().store_word(IO_START + 20, 2);
        machine.bus_mut().store_word(IO_START + 16, 0xCD);
        assert_eq!(machine.bus_mut().load_word(IO_START + 16), 22);

        assert_eq!(*disk_writes.borrow(), vec![0xAB]);
        assert_eq!(*net_writes.borrow(), vec![0xCD]);

        // SPI status always reports rx ready.
        assert_eq!(machine.bus_mut().load_word(IO_START + 20), 1);
    }

    #[test]
    fn configure_memory_reshapes_and_patches_rom() {
        let mut machine = Oberon::new();
        machine.configure_memory(2, 800, 600);

        let bus = machine.bus();
        assert_eq!(bus.display_start, 0x0020_0000);
        assert_eq!(bus.mem_size(), 0x0020_0000 + 800 * 600 / 8);
        assert!(bus.mem_size() >= bus.display_start + 800 * 600 / 8);

        // memLim = 0x1FFFF0, stackOrg = 0x100000.
        assert_eq!(
            machine.bus_mut().fetch(ROM_START / 4 + 372),
            Some(0x6100_001F)
        );
        assert_eq!(
            machine.bus_mut().fetch(ROM_START / 4 + 373),
            Some(0x4116_FFF0)
        );
        assert_eq!(
            machine.bus_mut().fetch(ROM_START / 4 + 376),
            Some(0x6100_0010)
        );

        // Relocation header for the guest display driver.
        let header = (DEFAULT_DISPLAY_START / 4) as usize;
        assert_eq!(machine.bus().mem[header], SIZE_MAGIC);
        assert_eq!(machine.bus().mem[header + 1], 800);
        assert_eq!(machine.bus().mem[header + 2], 600);
        assert_eq!(machine.bus().mem[header + 3], 0x0020_0000);

        // Reset into the ROM window.
        assert_eq!(machine.cpu().pc, ROM_START / 4);
    }

    #[test]
    fn configure_memory_clamps_megabytes() {
        let mut machine = Oberon::new();
        machine.configure_memory(64, 1024, 768);
        assert_eq!(machine.bus().display_start, 32 << 20);
    }

    #[test]
    fn run_reports_fault_and_resets() {
        let mut machine = Oberon::new();
        // Jump into the unmapped hole between RAM and ROM.
        machine.cpu_mut().pc = 0x0800_0000;
        let fault = machine.run(10).unwrap_err();
        assert_eq!(fault.pc, 0x0800_0000);
        assert_eq!(machine.cpu().pc, ROM_START / 4);
    }
}
