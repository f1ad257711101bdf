use std::io::Write as _;

use dotmatrix_core::cartridge::{Cartridge, CartridgeError, MbcKind};

/// Image sized to the header's ROM code, with the first byte of every bank
/// marked by its bank number.
fn rom_image(mapper: u8, rom_size: u8, ram_size: u8) -> Vec<u8> {
    let banks = 2usize << (rom_size & 0x0F);
    let mut rom = vec![0u8; banks * 0x4000];
    for bank in 0..banks {
        rom[bank * 0x4000] = bank as u8;
    }
    rom[0x0134..0x013C].copy_from_slice(b"BANKTEST");
    rom[0x0147] = mapper;
    rom[0x0148] = rom_size;
    rom[0x0149] = ram_size;
    rom
}

#[test]
fn header_fields_parse() {
    let cart = Cartridge::load(rom_image(0x01, 0x06, 0x03)).unwrap();
    assert_eq!(cart.title(), "BANKTEST");
    assert_eq!(cart.kind(), MbcKind::Mbc1);
    assert_eq!(cart.rom_banks(), 128);
    assert_eq!(cart.ram_banks(), 4);
}

#[test]
fn load_rejects_truncated_images() {
    let err = Cartridge::load(vec![0; 0x100]).unwrap_err();
    assert!(matches!(err, CartridgeError::TooShort(0x100)));
}

#[test]
fn load_rejects_unknown_mappers() {
    let mut rom = rom_image(0x00, 0x00, 0x00);
    rom[0x0147] = 0x22; // MBC7
    let err = Cartridge::load(rom).unwrap_err();
    assert!(matches!(err, CartridgeError::UnsupportedMapper(0x22)));
}

#[test]
fn load_rejects_unknown_ram_codes() {
    let mut rom = rom_image(0x00, 0x00, 0x00);
    rom[0x0149] = 0x05;
    let err = Cartridge::load(rom).unwrap_err();
    assert!(matches!(err, CartridgeError::UnsupportedRamSize(0x05)));
}

#[test]
fn plain_rom_ignores_bank_writes() {
    let mut cart = Cartridge::load(rom_image(0x00, 0x00, 0x02)).unwrap();
    cart.write(0x2000, 0x05);
    assert_eq!(cart.switchable_bank(), 1);
    assert_eq!(cart.read(0x4000), 1);
    // header RAM is mapped without an enable gate
    cart.write(0xA000, 0x77);
    assert_eq!(cart.read(0xA000), 0x77);
}

#[test]
fn mbc1_zero_select_aliases_to_the_next_bank() {
    let mut cart = Cartridge::load(rom_image(0x01, 0x06, 0x00)).unwrap();
    for (hi, expected) in [(0u8, 0x01u8), (1, 0x21), (2, 0x41), (3, 0x61)] {
        cart.write(0x2000, 0x00);
        cart.write(0x4000, hi);
        assert_eq!(cart.switchable_bank(), expected as usize);
        assert_eq!(cart.read(0x4000), expected);
    }
}

#[test]
fn mbc1_mode_selects_the_bank_decode() {
    let mut cart = Cartridge::load(rom_image(0x01, 0x06, 0x03)).unwrap();
    cart.write(0x2000, 0x12);
    cart.write(0x4000, 0x01);
    assert_eq!(cart.switchable_bank(), 0x32); // hi<<5 | low
    cart.write(0x6000, 0x01);
    assert_eq!(cart.switchable_bank(), 0x12); // hi ignored in mode 1
    // the low window shows bank 0 in either mode
    assert_eq!(cart.read(0x0134), b'B');
}

#[test]
fn mbc1_ram_banking_in_mode_1() {
    let mut cart = Cartridge::load(rom_image(0x03, 0x06, 0x03)).unwrap();
    cart.write(0xA000, 0x55); // gate still closed, dropped
    assert_eq!(cart.read(0xA000), 0xFF);

    cart.write(0x0000, 0x0A);
    cart.write(0x6000, 0x01);
    cart.write(0x4000, 0x02);
    cart.write(0xA000, 0x55);
    cart.write(0x4000, 0x00);
    assert_eq!(cart.read(0xA000), 0x00);
    cart.write(0x4000, 0x02);
    assert_eq!(cart.read(0xA000), 0x55);

    // mode 0 pins the RAM window to bank 0
    cart.write(0x6000, 0x00);
    assert_eq!(cart.read(0xA000), 0x00);
}

#[test]
fn bank_selects_wrap_against_the_header_count() {
    let mut cart = Cartridge::load(rom_image(0x01, 0x00, 0x00)).unwrap(); // 2 banks
    cart.write(0x2000, 0x03);
    assert_eq!(cart.switchable_bank(), 1); // 3 % 2
}

#[test]
fn reads_past_a_short_image_come_back_open() {
    // header claims 128 banks but the vec only holds 2
    let mut rom = rom_image(0x01, 0x00, 0x00);
    rom[0x0148] = 0x06;
    let mut cart = Cartridge::load(rom).unwrap();
    cart.write(0x2000, 0x1F);
    cart.write(0x4000, 0x03);
    assert_eq!(cart.switchable_bank(), 0x7F);
    assert_eq!(cart.read(0x4000), 0xFF);
}

#[test]
fn mbc2_register_select_uses_address_bit_8() {
    let mut cart = Cartridge::load(rom_image(0x05, 0x03, 0x00)).unwrap(); // 16 banks
    cart.write(0x2100, 0x0F); // bit 8 set: ROM bank register
    assert_eq!(cart.switchable_bank(), 15);
    assert_eq!(cart.read(0x4000), 15);
    cart.write(0x2100, 0x00);
    assert_eq!(cart.switchable_bank(), 1);

    cart.write(0x0000, 0x0A); // bit 8 clear: RAM gate
    cart.write(0xA005, 0xA7);
    assert_eq!(cart.read(0xA005), 0xF7); // upper nibble reads as 1s
    assert_eq!(cart.read(0xA205), 0xF7); // 512 nibbles mirror across the window
    cart.write(0x0000, 0x00);
    assert_eq!(cart.read(0xA005), 0xFF);
}

#[test]
fn mbc3_bank_and_ram_select() {
    let mut cart = Cartridge::load(rom_image(0x11, 0x06, 0x03)).unwrap();
    cart.write(0x2000, 0x00);
    assert_eq!(cart.switchable_bank(), 1);
    cart.write(0x2000, 0x45);
    assert_eq!(cart.switchable_bank(), 0x45);
    assert_eq!(cart.read(0x4000), 0x45);

    cart.write(0x0000, 0x0A);
    cart.write(0x4000, 0x02);
    cart.write(0xA000, 0x99);
    cart.write(0x4000, 0x00);
    assert_eq!(cart.read(0xA000), 0x00);
    cart.write(0x4000, 0x02);
    assert_eq!(cart.read(0xA000), 0x99);

    // selects above 3 would be the clock; reads come back open
    cart.write(0x4000, 0x08);
    assert_eq!(cart.read(0xA000), 0xFF);
}

#[test]
fn from_file_round_trip() {
    let rom = rom_image(0x01, 0x00, 0x00);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&rom).unwrap();
    let cart = Cartridge::from_file(file.path()).unwrap();
    assert_eq!(cart.title(), "BANKTEST");
    assert_eq!(cart.kind(), MbcKind::Mbc1);

    let missing = Cartridge::from_file("/nonexistent/image.gb");
    assert!(matches!(missing.unwrap_err(), CartridgeError::Io(_)));
}
