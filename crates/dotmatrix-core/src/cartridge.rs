use std::{error, fmt};

use log::info;

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;

// Cartridge header offsets (gbdev.io/pandocs/The_Cartridge_Header.html).
const HEADER_TITLE: usize = 0x0134;
const HEADER_TITLE_END: usize = 0x0143;
const HEADER_CART_TYPE: usize = 0x0147;
const HEADER_ROM_SIZE: usize = 0x0148;
const HEADER_RAM_SIZE: usize = 0x0149;

/// A ROM shorter than this cannot contain a complete header.
const MIN_ROM_LEN: usize = 0x0150;

/// Bank-controller kinds exercised by this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperKind {
    /// 32 KiB ROM wired straight to the bus, no banking circuit.
    None,
    /// 5-bit ROM bank register with RAM banking / banking-mode select.
    Mbc1,
    /// 7-bit ROM bank register, direct RAM bank select. The RTC registers
    /// this controller can carry are not emulated; selecting them reads as
    /// open bus.
    Mbc3,
}

/// Facts derived once from the cartridge header. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeInfo {
    pub kind: MapperKind,
    pub rom_banks: usize,
    pub ram_banks: usize,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartridgeError {
    /// ROM image ends before the header does.
    TooShort(usize),
    /// The cartridge-type byte names a bank controller this core does not
    /// implement.
    UnsupportedMapper(u8),
}

impl fmt::Display for CartridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CartridgeError::TooShort(len) => write!(
                f,
                "ROM image is {len} bytes, shorter than the {MIN_ROM_LEN}-byte header"
            ),
            CartridgeError::UnsupportedMapper(ty) => {
                write!(f, "unsupported cartridge type byte 0x{ty:02X}")
            }
        }
    }
}

impl error::Error for CartridgeError {}

#[derive(Debug)]
enum MapperState {
    None,
    Mbc1 {
        rom_bank: u8,
        /// RAM bank or upper ROM bank bits, depending on `mode`.
        bank_hi: u8,
        /// 0 = simple (ROM) banking, 1 = RAM banking.
        mode: u8,
        ram_enabled: bool,
    },
    Mbc3 {
        rom_bank: u8,
        ram_bank: u8,
        ram_enabled: bool,
    },
}

/// Cartridge ROM/RAM with its bank-controller strategy. All reads and writes
/// below 0x8000 and in 0xA000-0xBFFF are routed here by the MMU; register
/// writes are interpreted per controller kind.
#[derive(Debug)]
pub struct Cartridge {
    rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub info: CartridgeInfo,
    state: MapperState,
}

impl Cartridge {
    /// Parse the header and build the mapper for a raw ROM image. Fails when
    /// the image is shorter than the header or names an unsupported bank
    /// controller.
    pub fn load(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        if rom.len() < MIN_ROM_LEN {
            return Err(CartridgeError::TooShort(rom.len()));
        }

        let header = Header { data: &rom };
        let kind = header.mapper_kind()?;
        let info = CartridgeInfo {
            kind,
            rom_banks: header.rom_banks(),
            ram_banks: header.ram_banks(),
            title: header.title(),
        };

        let state = match kind {
            MapperKind::None => MapperState::None,
            MapperKind::Mbc1 => MapperState::Mbc1 {
                rom_bank: 1,
                bank_hi: 0,
                mode: 0,
                ram_enabled: false,
            },
            MapperKind::Mbc3 => MapperState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enabled: false,
            },
        };

        info!(
            "loaded cartridge \"{}\": {:?}, {} ROM banks, {} RAM banks",
            info.title, info.kind, info.rom_banks, info.ram_banks
        );

        Ok(Self {
            ram: vec![0; info.ram_banks * RAM_BANK_SIZE],
            rom,
            info,
            state,
        })
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => {
                let bank = self.fixed_rom_bank();
                self.rom_byte(bank, addr as usize)
            }
            0x4000..=0x7FFF => {
                let bank = self.switchable_rom_bank();
                self.rom_byte(bank, addr as usize - ROM_BANK_SIZE)
            }
            0xA000..=0xBFFF => match &self.state {
                MapperState::None => self.ram_byte(0, addr),
                MapperState::Mbc1 {
                    ram_enabled: false, ..
                }
                | MapperState::Mbc3 {
                    ram_enabled: false, ..
                } => 0xFF,
                MapperState::Mbc1 { bank_hi, mode, .. } => {
                    let bank = if *mode == 1 { *bank_hi & 0x03 } else { 0 };
                    self.ram_byte(bank as usize, addr)
                }
                MapperState::Mbc3 { ram_bank, .. } => match ram_bank {
                    0x00..=0x03 => self.ram_byte(*ram_bank as usize, addr),
                    // RTC register selects; the clock itself is out of scope.
                    _ => 0xFF,
                },
            },
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match &mut self.state {
            MapperState::None => match addr {
                0xA000..=0xBFFF => self.ram_write(0, addr, val),
                _ => {
                    // No controller, so writes into the ROM window hit mask
                    // ROM and change nothing.
                    log::warn!("ignoring write of 0x{val:02X} to ROM at 0x{addr:04X}");
                }
            },
            MapperState::Mbc1 {
                rom_bank,
                bank_hi,
                mode,
                ram_enabled,
            } => match addr {
                0x0000..=0x1FFF => *ram_enabled = val & 0x0F == 0x0A,
                0x2000..=0x3FFF => {
                    // A 5-bit register that cannot hold zero: writing 0
                    // selects bank 1.
                    *rom_bank = val & 0x1F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
                0x4000..=0x5FFF => *bank_hi = val & 0x03,
                0x6000..=0x7FFF => *mode = val & 0x01,
                0xA000..=0xBFFF => {
                    if *ram_enabled {
                        let bank = if *mode == 1 { *bank_hi & 0x03 } else { 0 };
                        self.ram_write(bank as usize, addr, val);
                    }
                }
                _ => {}
            },
            MapperState::Mbc3 {
                rom_bank,
                ram_bank,
                ram_enabled,
            } => match addr {
                0x0000..=0x1FFF => *ram_enabled = val & 0x0F == 0x0A,
                0x2000..=0x3FFF => {
                    *rom_bank = val & 0x7F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
                0x4000..=0x5FFF => *ram_bank = val & 0x0F,
                0x6000..=0x7FFF => {
                    // RTC latch sequence; nothing to latch without a clock.
                }
                0xA000..=0xBFFF => {
                    if *ram_enabled && *ram_bank <= 0x03 {
                        let bank = *ram_bank as usize;
                        self.ram_write(bank, addr, val);
                    }
                }
                _ => {}
            },
        }
    }

    fn fixed_rom_bank(&self) -> usize {
        match &self.state {
            // In RAM-banking mode the upper bits also remap the fixed window.
            MapperState::Mbc1 { bank_hi, mode, .. } if *mode == 1 => {
                ((*bank_hi as usize) << 5) % self.info.rom_banks
            }
            _ => 0,
        }
    }

    fn switchable_rom_bank(&self) -> usize {
        let bank = match &self.state {
            MapperState::None => 1,
            MapperState::Mbc1 {
                rom_bank, bank_hi, ..
            } => ((*bank_hi as usize) << 5) | *rom_bank as usize,
            MapperState::Mbc3 { rom_bank, .. } => *rom_bank as usize,
        };
        bank % self.info.rom_banks
    }

    fn rom_byte(&self, bank: usize, offset: usize) -> u8 {
        self.rom
            .get(bank * ROM_BANK_SIZE + offset)
            .copied()
            .unwrap_or(0xFF)
    }

    fn ram_byte(&self, bank: usize, addr: u16) -> u8 {
        let idx = bank * RAM_BANK_SIZE + (addr as usize - 0xA000);
        self.ram.get(idx).copied().unwrap_or(0xFF)
    }

    fn ram_write(&mut self, bank: usize, addr: u16, val: u8) {
        let idx = bank * RAM_BANK_SIZE + (addr as usize - 0xA000);
        if let Some(b) = self.ram.get_mut(idx) {
            *b = val;
        }
    }

    /// Return the bank-controller registers to their power-on values.
    pub fn reset_mapper(&mut self) {
        self.state = match self.info.kind {
            MapperKind::None => MapperState::None,
            MapperKind::Mbc1 => MapperState::Mbc1 {
                rom_bank: 1,
                bank_hi: 0,
                mode: 0,
                ram_enabled: false,
            },
            MapperKind::Mbc3 => MapperState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enabled: false,
            },
        };
    }

    /// Mapper registers packed for save states: rom bank, ram bank / upper
    /// bits, banking mode, ram enable.
    pub(crate) fn mapper_regs(&self) -> [u8; 4] {
        match &self.state {
            MapperState::None => [0, 0, 0, 0],
            MapperState::Mbc1 {
                rom_bank,
                bank_hi,
                mode,
                ram_enabled,
            } => [*rom_bank, *bank_hi, *mode, *ram_enabled as u8],
            MapperState::Mbc3 {
                rom_bank,
                ram_bank,
                ram_enabled,
            } => [*rom_bank, *ram_bank, 0, *ram_enabled as u8],
        }
    }

    pub(crate) fn restore_mapper_regs(&mut self, regs: [u8; 4]) {
        match &mut self.state {
            MapperState::None => {}
            MapperState::Mbc1 {
                rom_bank,
                bank_hi,
                mode,
                ram_enabled,
            } => {
                *rom_bank = regs[0] & 0x1F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
                *bank_hi = regs[1] & 0x03;
                *mode = regs[2] & 0x01;
                *ram_enabled = regs[3] != 0;
            }
            MapperState::Mbc3 {
                rom_bank,
                ram_bank,
                ram_enabled,
            } => {
                *rom_bank = regs[0] & 0x7F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
                *ram_bank = regs[1] & 0x0F;
                *ram_enabled = regs[3] != 0;
            }
        }
    }
}

struct Header<'a> {
    data: &'a [u8],
}

impl Header<'_> {
    fn title(&self) -> String {
        let mut slice = &self.data[HEADER_TITLE..HEADER_TITLE_END];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn mapper_kind(&self) -> Result<MapperKind, CartridgeError> {
        let ty = self.data[HEADER_CART_TYPE];
        match ty {
            0x00 | 0x08 | 0x09 => Ok(MapperKind::None),
            0x01..=0x03 => Ok(MapperKind::Mbc1),
            0x0F..=0x13 => Ok(MapperKind::Mbc3),
            _ => Err(CartridgeError::UnsupportedMapper(ty)),
        }
    }

    fn rom_banks(&self) -> usize {
        // Size code N means 2^(N+1) 16 KiB banks.
        let code = self.data[HEADER_ROM_SIZE].min(8) as u32;
        2usize << code
    }

    fn ram_banks(&self) -> usize {
        // Fixed lookup; code 1 (a quarter-size chip) still occupies one
        // 8 KiB bank slot on the bus.
        match self.data[HEADER_RAM_SIZE] {
            0x00 => 0,
            0x01 | 0x02 => 1,
            0x03 => 4,
            0x04 => 16,
            0x05 => 8,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_header(cart_type: u8, rom_size: u8, ram_size: u8) -> Vec<u8> {
        let banks = 2usize << rom_size;
        let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
        rom[HEADER_CART_TYPE] = cart_type;
        rom[HEADER_ROM_SIZE] = rom_size;
        rom[HEADER_RAM_SIZE] = ram_size;
        rom
    }

    #[test]
    fn short_rom_is_rejected() {
        assert_eq!(
            Cartridge::load(vec![0; 0x100]).unwrap_err(),
            CartridgeError::TooShort(0x100)
        );
    }

    #[test]
    fn unsupported_mapper_is_rejected() {
        let rom = rom_with_header(0x19, 0, 0); // MBC5
        assert_eq!(
            Cartridge::load(rom).unwrap_err(),
            CartridgeError::UnsupportedMapper(0x19)
        );
    }

    #[test]
    fn header_bank_counts() {
        let cart = Cartridge::load(rom_with_header(0x13, 2, 0x03)).unwrap();
        assert_eq!(cart.info.kind, MapperKind::Mbc3);
        assert_eq!(cart.info.rom_banks, 8);
        assert_eq!(cart.info.ram_banks, 4);
    }
}
