use std::{error, fmt, fs, io, path::Path};

const HEADER_END: usize = 0x150;
const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;

/// Banking controller selected by header byte 0x0147.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    None,
    Mbc1,
    Mbc2,
    Mbc3,
}

/// Errors detected while loading a ROM image. All of these are fatal:
/// running with a misparsed header would silently corrupt banking.
#[derive(Debug)]
pub enum CartridgeError {
    Io(io::Error),
    /// Image too small to contain the 0x150-byte header.
    TooShort(usize),
    /// Header byte 0x0147 names a controller this core does not implement.
    UnsupportedMapper(u8),
    /// Header byte 0x0149 is outside the known RAM size codes.
    UnsupportedRamSize(u8),
}

impl fmt::Display for CartridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CartridgeError::Io(e) => write!(f, "failed to read ROM: {e}"),
            CartridgeError::TooShort(len) => {
                write!(f, "ROM image is {len} bytes, too short for a cartridge header")
            }
            CartridgeError::UnsupportedMapper(code) => {
                write!(f, "unsupported mapper code {code:#04X} in cartridge header")
            }
            CartridgeError::UnsupportedRamSize(code) => {
                write!(f, "unsupported RAM size code {code:#04X} in cartridge header")
            }
        }
    }
}

impl error::Error for CartridgeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            CartridgeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CartridgeError {
    fn from(e: io::Error) -> Self {
        CartridgeError::Io(e)
    }
}

#[derive(Debug)]
enum MbcState {
    None,
    Mbc1 {
        rom_bank: u8,
        bank_hi: u8,
        mode: u8,
        ram_enable: bool,
    },
    Mbc2 {
        rom_bank: u8,
        ram_enable: bool,
    },
    Mbc3 {
        rom_bank: u8,
        ram_bank: u8,
        ram_enable: bool,
    },
}

#[derive(Debug)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    kind: MbcKind,
    title: String,
    /// Bank count declared by header byte 0x0148, not derived from the
    /// image length; bank selects wrap against this.
    rom_banks: usize,
    ram_banks: usize,
    state: MbcState,
}

impl Cartridge {
    /// Parse the header and build the banking state for a raw ROM image.
    pub fn load(data: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = Header::parse(&data)?;
        let kind = header.mbc_kind()?;
        let rom_banks = header.rom_banks();
        let ram_banks = header.ram_banks()?;
        let title = header.title();

        // MBC2 carries 512x4-bit RAM on the controller itself; the header RAM
        // size byte does not describe it.
        let ram_len = match kind {
            MbcKind::Mbc2 => 0x200,
            _ => ram_banks * RAM_BANK_SIZE,
        };

        let state = match kind {
            MbcKind::None => MbcState::None,
            MbcKind::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                bank_hi: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcKind::Mbc2 => MbcState::Mbc2 {
                rom_bank: 1,
                ram_enable: false,
            },
            MbcKind::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
        };

        log::debug!(
            "loaded cartridge \"{title}\" ({kind:?}, {rom_banks} ROM banks, {ram_banks} RAM banks)"
        );

        Ok(Self {
            rom: data,
            ram: vec![0; ram_len],
            kind,
            title,
            rom_banks,
            ram_banks,
            state,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let data = fs::read(path)?;
        Self::load(data)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> MbcKind {
        self.kind
    }

    pub fn rom_banks(&self) -> usize {
        self.rom_banks
    }

    pub fn ram_banks(&self) -> usize {
        self.ram_banks
    }

    /// ROM bank currently mapped at the 0x4000-0x7FFF window.
    pub fn switchable_bank(&self) -> usize {
        match &self.state {
            MbcState::None => 1,
            MbcState::Mbc1 {
                rom_bank,
                bank_hi,
                mode,
                ..
            } => {
                let mut bank = if *mode == 0 {
                    ((*bank_hi as usize) << 5) | (*rom_bank as usize & 0x1F)
                } else {
                    *rom_bank as usize & 0x1F
                };
                if bank & 0x1F == 0 {
                    bank += 1;
                }
                bank % self.rom_banks
            }
            MbcState::Mbc2 { rom_bank, .. } => {
                let bank = (*rom_bank & 0x0F).max(1) as usize;
                bank % self.rom_banks
            }
            MbcState::Mbc3 { rom_bank, .. } => {
                let bank = (*rom_bank & 0x7F).max(1) as usize;
                bank % self.rom_banks
            }
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            // The low window always shows bank 0.
            0x0000..=0x3FFF => self.rom.get(addr as usize).copied().unwrap_or(0xFF),
            0x4000..=0x7FFF => {
                let offset = self.switchable_bank() * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            0xA000..=0xBFFF => match &self.state {
                MbcState::None => {
                    let idx = addr as usize - 0xA000;
                    self.ram.get(idx).copied().unwrap_or(0xFF)
                }
                MbcState::Mbc1 { ram_enable, .. } => {
                    if !*ram_enable {
                        0xFF
                    } else {
                        let idx = self.ram_index(addr);
                        self.ram.get(idx).copied().unwrap_or(0xFF)
                    }
                }
                MbcState::Mbc2 { ram_enable, .. } => {
                    if !*ram_enable {
                        0xFF
                    } else {
                        // 512 nibbles mirrored across the window; the upper
                        // nibble reads as 1s.
                        let idx = (addr as usize - 0xA000) & 0x01FF;
                        let nibble = self.ram.get(idx).copied().unwrap_or(0x0F) & 0x0F;
                        0xF0 | nibble
                    }
                }
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    ..
                } => {
                    if !*ram_enable || *ram_bank > 0x03 {
                        0xFF
                    } else {
                        let idx = self.ram_index(addr);
                        self.ram.get(idx).copied().unwrap_or(0xFF)
                    }
                }
            },
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match (&mut self.state, addr) {
            (MbcState::None, 0xA000..=0xBFFF) => {
                let idx = addr as usize - 0xA000;
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val;
                }
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x1F;
            }
            (MbcState::Mbc1 { bank_hi, .. }, 0x4000..=0x5FFF) => {
                *bank_hi = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = self.ram_index(addr);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            (
                MbcState::Mbc2 {
                    rom_bank,
                    ram_enable,
                },
                0x0000..=0x3FFF,
            ) => {
                // Address bit 8 selects between the RAM gate (clear) and the
                // ROM bank register (set) over the whole range.
                if addr & 0x0100 == 0 {
                    *ram_enable = val & 0x0F == 0x0A;
                } else {
                    *rom_bank = val & 0x0F;
                }
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = (addr as usize - 0xA000) & 0x01FF;
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val & 0x0F;
                    }
                }
            }
            (MbcState::Mbc3 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x7F;
            }
            (MbcState::Mbc3 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val;
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if *ram_enable && *ram_bank <= 0x03 {
                    let idx = self.ram_index(addr);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            _ => {}
        }
    }

    fn ram_index(&self, addr: u16) -> usize {
        match &self.state {
            MbcState::None | MbcState::Mbc2 { .. } => addr as usize - 0xA000,
            MbcState::Mbc1 { bank_hi, mode, .. } => {
                // The secondary register selects the RAM bank only in mode 1.
                let bank = if *mode == 0 || self.ram_banks <= 1 {
                    0
                } else {
                    (*bank_hi as usize) % self.ram_banks
                };
                bank * RAM_BANK_SIZE + addr as usize - 0xA000
            }
            MbcState::Mbc3 { ram_bank, .. } => {
                (*ram_bank as usize & 0x03) * RAM_BANK_SIZE + addr as usize - 0xA000
            }
        }
    }
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_END {
            return Err(CartridgeError::TooShort(data.len()));
        }
        Ok(Self { data })
    }

    fn title(&self) -> String {
        let mut slice = &self.data[0x0134..0x0144];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn mbc_kind(&self) -> Result<MbcKind, CartridgeError> {
        match self.data[0x0147] {
            0x00 => Ok(MbcKind::None),
            0x01..=0x03 => Ok(MbcKind::Mbc1),
            0x05 | 0x06 => Ok(MbcKind::Mbc2),
            0x0F..=0x13 => Ok(MbcKind::Mbc3),
            code => Err(CartridgeError::UnsupportedMapper(code)),
        }
    }

    fn rom_banks(&self) -> usize {
        // Code n means 32 KiB << n of ROM, i.e. 2^(n+1) banks.
        2usize << (self.data[0x0148] & 0x0F)
    }

    fn ram_banks(&self) -> Result<usize, CartridgeError> {
        match self.data[0x0149] {
            0x00 => Ok(0),
            0x01 | 0x02 => Ok(1),
            0x03 => Ok(4),
            0x04 => Ok(16),
            code => Err(CartridgeError::UnsupportedRamSize(code)),
        }
    }
}
