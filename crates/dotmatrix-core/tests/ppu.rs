use dotmatrix_core::ppu::{Mode, Ppu};

/// PPU with the display switched on, parked at the start of line 0.
fn lit_ppu() -> Ppu {
    let mut ppu = Ppu::new();
    ppu.write_reg(0xFF40, 0x91);
    ppu
}

#[test]
fn mode_sequence_and_line_budget() {
    let mut ppu = lit_ppu();
    let mut if_reg = 0u8;

    assert_eq!(ppu.mode, Mode::OamScan);
    ppu.step(80, &mut if_reg);
    assert_eq!(ppu.mode, Mode::OamScan);
    ppu.step(4, &mut if_reg); // 84
    assert_eq!(ppu.mode, Mode::PixelTransfer);
    ppu.step(172, &mut if_reg); // 256
    assert_eq!(ppu.mode, Mode::HBlank);
    assert_eq!(ppu.ly(), 0);
    ppu.step(200, &mut if_reg); // 456
    assert_eq!(ppu.mode, Mode::OamScan);
    assert_eq!(ppu.ly(), 1);
}

#[test]
fn fine_scroll_stretches_transfer_into_hblank() {
    let mut ppu = lit_ppu();
    let mut if_reg = 0u8;
    ppu.write_reg(0xFF43, 3); // SCX

    ppu.step(84, &mut if_reg);
    assert_eq!(ppu.mode, Mode::PixelTransfer);
    ppu.step(172, &mut if_reg); // needs 175 now
    assert_eq!(ppu.mode, Mode::PixelTransfer);
    ppu.step(4, &mut if_reg);
    assert_eq!(ppu.mode, Mode::HBlank);

    // H-blank gives the stretch back; the line still totals 456.
    ppu.step(196, &mut if_reg);
    assert_eq!(ppu.mode, Mode::OamScan);
    assert_eq!(ppu.ly(), 1);
}

#[test]
fn vblank_raises_the_interrupt_and_the_frame_flag() {
    let mut ppu = lit_ppu();
    let mut if_reg = 0u8;
    ppu.write_reg(0xFF41, 0x10); // V-blank STAT source

    for _ in 0..144 {
        ppu.step(456, &mut if_reg);
    }
    assert_eq!(ppu.mode, Mode::VBlank);
    assert_eq!(ppu.ly(), 144);
    assert!(ppu.frame_ready());
    assert_eq!(ppu.frames(), 1);
    // dedicated V-blank bit plus the STAT mode source
    assert_eq!(if_reg & 0x03, 0x03);
}

#[test]
fn ly_reports_zero_early_on_the_last_line() {
    let mut ppu = lit_ppu();
    let mut if_reg = 0u8;

    for _ in 0..153 {
        ppu.step(456, &mut if_reg);
    }
    assert_eq!(ppu.ly(), 153);
    assert_eq!(ppu.mode, Mode::VBlank);

    ppu.step(52, &mut if_reg);
    assert_eq!(ppu.ly(), 153);
    ppu.step(4, &mut if_reg); // tick 56 of the final line
    assert_eq!(ppu.read_reg(0xFF44), 0);
    assert_eq!(ppu.mode, Mode::VBlank);

    ppu.step(400, &mut if_reg); // line rolls over into the next frame
    assert_eq!(ppu.mode, Mode::OamScan);
    assert_eq!(ppu.ly(), 0);
}

#[test]
fn frames_are_exactly_70224_ticks() {
    let mut ppu = lit_ppu();
    let mut if_reg = 0u8;

    let mut ticks = 0u64;
    while !ppu.frame_ready() {
        ppu.step(4, &mut if_reg);
        ticks += 4;
    }
    let first = ticks;
    assert_eq!(first, 144 * 456);

    ppu.clear_frame_flag();
    while !ppu.frame_ready() {
        ppu.step(4, &mut if_reg);
        ticks += 4;
    }
    assert_eq!(ticks - first, 70224);
}

#[test]
fn lyc_match_raises_the_stat_interrupt() {
    let mut ppu = lit_ppu();
    let mut if_reg = 0u8;
    ppu.write_reg(0xFF45, 2);
    ppu.write_reg(0xFF41, 0x40); // coincidence source only

    ppu.step(456, &mut if_reg);
    assert_eq!(if_reg, 0);
    ppu.step(456, &mut if_reg); // LY becomes 2
    assert_eq!(if_reg & 0x02, 0x02);
    assert_eq!(ppu.read_reg(0xFF41), 0xC6); // source, match bit, OAM-scan mode
}

#[test]
fn stat_line_held_by_hblank_masks_the_oam_scan_edge() {
    let mut ppu = lit_ppu();
    let mut if_reg = 0u8;

    // Enable the sources only once line 0 is past its OAM scan.
    ppu.step(184, &mut if_reg);
    assert_eq!(ppu.mode, Mode::PixelTransfer);
    ppu.write_reg(0xFF41, 0x28); // H-blank + OAM-scan sources
    ppu.step(80, &mut if_reg);
    assert_eq!(ppu.mode, Mode::HBlank);
    assert_eq!(if_reg & 0x02, 0x02);

    // The line stays high across the H-blank/OAM-scan seam, so entering
    // line 1 produces no second edge.
    if_reg = 0;
    ppu.step(192, &mut if_reg);
    assert_eq!(ppu.mode, Mode::OamScan);
    assert_eq!(ppu.ly(), 1);
    assert_eq!(if_reg, 0);

    // Pixel transfer drops the line mid-line, so the next H-blank fires.
    ppu.step(456, &mut if_reg);
    assert_eq!(if_reg & 0x02, 0x02);
}

#[test]
fn lyc_match_holding_the_line_masks_the_oam_scan_edge() {
    let mut ppu = lit_ppu();
    let mut if_reg = 0u8;
    ppu.write_reg(0xFF45, 1);
    ppu.write_reg(0xFF41, 0x60); // coincidence + OAM-scan sources

    ppu.step(456, &mut if_reg); // into line 1, where LY == LYC
    if_reg = 0;

    // Coincidence holds the line through all of line 1; the hand-off to
    // line 2's OAM scan happens without the line ever dropping.
    ppu.step(456, &mut if_reg);
    assert_eq!(ppu.ly(), 2);
    assert_eq!(if_reg, 0);

    // Once the line has dropped during line 2's pixel transfer, the next
    // OAM scan fires again.
    ppu.step(456, &mut if_reg);
    assert_eq!(ppu.ly(), 3);
    assert_eq!(if_reg & 0x02, 0x02);
}

#[test]
fn ly_writes_reset_the_counter() {
    let mut ppu = lit_ppu();
    let mut if_reg = 0u8;

    for _ in 0..5 {
        ppu.step(456, &mut if_reg);
    }
    assert_eq!(ppu.ly(), 5);
    ppu.write_reg(0xFF44, 0x77);
    assert_eq!(ppu.ly(), 0);
    // the comparison refreshes against the default LYC of 0
    assert_eq!(ppu.read_reg(0xFF41) & 0x04, 0x04);
}

#[test]
fn disabling_the_display_parks_the_ppu() {
    let mut ppu = lit_ppu();
    let mut if_reg = 0u8;

    for _ in 0..3 {
        ppu.step(456, &mut if_reg);
    }
    ppu.step(100, &mut if_reg);
    ppu.write_reg(0xFF40, 0x11); // bit 7 clear
    assert_eq!(ppu.ly(), 0);
    assert_eq!(ppu.read_reg(0xFF41) & 0x03, 0); // H-blank

    for _ in 0..200 {
        ppu.step(456, &mut if_reg);
    }
    assert!(!ppu.frame_ready());
    assert_eq!(ppu.ly(), 0);
    assert_eq!(if_reg, 0);
}

#[test]
fn reenabling_restarts_from_line_zero() {
    let mut ppu = lit_ppu();
    let mut if_reg = 0u8;

    for _ in 0..7 {
        ppu.step(456, &mut if_reg);
    }
    ppu.step(250, &mut if_reg);
    ppu.write_reg(0xFF40, 0x11);
    ppu.write_reg(0xFF40, 0x91);
    assert_eq!(ppu.mode, Mode::OamScan);
    assert_eq!(ppu.ly(), 0);

    let mut ticks = 0u64;
    while !ppu.frame_ready() {
        ppu.step(4, &mut if_reg);
        ticks += 4;
    }
    assert_eq!(ticks, 144 * 456);
}

#[test]
fn window_line_counter_only_advances_where_the_window_shows() {
    let mut ppu = Ppu::new();
    let mut if_reg = 0u8;
    ppu.write_reg(0xFF4A, 100); // WY
    ppu.write_reg(0xFF4B, 7); // WX, flush left
    ppu.write_reg(0xFF40, 0xA1); // display + window + background

    for _ in 0..100 {
        ppu.step(456, &mut if_reg);
    }
    assert_eq!(ppu.window_line_counter(), 0);
    for _ in 0..20 {
        ppu.step(456, &mut if_reg);
    }
    assert_eq!(ppu.window_line_counter(), 20);
}

#[test]
fn offscreen_window_position_never_counts() {
    let mut ppu = Ppu::new();
    let mut if_reg = 0u8;
    ppu.write_reg(0xFF4A, 0);
    ppu.write_reg(0xFF4B, 200); // beyond the 166 clip
    ppu.write_reg(0xFF40, 0xA1);

    for _ in 0..120 {
        ppu.step(456, &mut if_reg);
    }
    assert_eq!(ppu.window_line_counter(), 0);
}

/// Solid color-3 tile at the given tile index.
fn fill_tile(ppu: &mut Ppu, tile: usize, lo: u8, hi: u8) {
    for row in 0..8 {
        ppu.vram[tile * 16 + row * 2] = lo;
        ppu.vram[tile * 16 + row * 2 + 1] = hi;
    }
}

fn sprite(ppu: &mut Ppu, slot: usize, y: u8, x: u8, tile: u8, flags: u8) {
    let base = slot * 4;
    ppu.oam[base] = y;
    ppu.oam[base + 1] = x;
    ppu.oam[base + 2] = tile;
    ppu.oam[base + 3] = flags;
}

#[test]
fn sprite_pixels_blend_by_priority() {
    let mut ppu = Ppu::new();
    let mut if_reg = 0u8;
    fill_tile(&mut ppu, 1, 0xFF, 0xFF);
    ppu.vram[0x1802] = 1; // background tile at columns 16-23
    ppu.write_reg(0xFF47, 0xE4); // identity shades
    ppu.write_reg(0xFF48, 0x40); // sprite color 3 reads shade 1

    sprite(&mut ppu, 0, 16, 8, 1, 0x00); // screen x 0, in front
    sprite(&mut ppu, 1, 16, 24, 1, 0x80); // screen x 16, behind opaque bg
    sprite(&mut ppu, 2, 16, 48, 1, 0x80); // screen x 40, behind color-0 bg

    ppu.write_reg(0xFF40, 0x93);
    ppu.step(456, &mut if_reg);

    assert_eq!(ppu.framebuffer[0], 1); // front sprite
    assert_eq!(ppu.framebuffer[8], 0); // bare background
    assert_eq!(ppu.framebuffer[16], 3); // opaque background beats priority bit
    assert_eq!(ppu.framebuffer[40], 1); // behind-flag sprite over color 0
}

#[test]
fn ten_sprites_per_line_in_table_order() {
    let mut ppu = Ppu::new();
    let mut if_reg = 0u8;
    fill_tile(&mut ppu, 1, 0xFF, 0xFF);
    ppu.write_reg(0xFF48, 0x40);

    for i in 0..12u8 {
        sprite(&mut ppu, i as usize, 16, 8 + 8 * i, 1, 0x00);
    }

    ppu.write_reg(0xFF40, 0x93);
    ppu.step(456, &mut if_reg);

    assert_eq!(ppu.framebuffer[0], 1);
    assert_eq!(ppu.framebuffer[72], 1); // tenth sprite still drawn
    assert_eq!(ppu.framebuffer[80], 0); // eleventh dropped
    assert_eq!(ppu.framebuffer[88], 0);
}

#[test]
fn sprite_flips_mirror_the_tile() {
    let mut ppu = Ppu::new();
    let mut if_reg = 0u8;
    // tile 2 row 0: left half color 1, right half transparent
    ppu.vram[32] = 0xF0;
    ppu.write_reg(0xFF48, 0xE4);

    sprite(&mut ppu, 0, 16, 8, 2, 0x20); // X flip at screen x 0
    sprite(&mut ppu, 1, 16, 24, 2, 0x40); // Y flip at screen x 16

    ppu.write_reg(0xFF40, 0x93);
    ppu.step(456, &mut if_reg);

    // X flip moves the opaque half to the right.
    assert_eq!(ppu.framebuffer[0], 0);
    assert_eq!(ppu.framebuffer[4], 1);
    // Y flip samples row 7, which is empty.
    assert_eq!(ppu.framebuffer[16], 0);
    assert_eq!(ppu.framebuffer[20], 0);
}

#[test]
fn tall_sprites_mask_the_tile_low_bit() {
    let mut ppu = Ppu::new();
    let mut if_reg = 0u8;
    ppu.vram[32] = 0xF0; // tile 2 row 0: left half set
    ppu.vram[48] = 0x0F; // tile 3 row 0: right half set
    ppu.write_reg(0xFF48, 0xE4);

    // Odd index in 8x16 mode resolves to the even pair.
    sprite(&mut ppu, 0, 16, 8, 3, 0x00);

    ppu.write_reg(0xFF40, 0x97); // 8x16 sprites
    ppu.step(456, &mut if_reg);
    assert_eq!(ppu.framebuffer[0], 1); // top half comes from tile 2
    assert_eq!(ppu.framebuffer[4], 0);

    ppu.step(8 * 456, &mut if_reg); // render down to line 8
    let row = 8 * 160;
    assert_eq!(ppu.framebuffer[row], 0); // bottom half comes from tile 3
    assert_eq!(ppu.framebuffer[row + 4], 1);
}

#[test]
fn earlier_oam_entries_win_overlaps() {
    let mut ppu = Ppu::new();
    let mut if_reg = 0u8;
    fill_tile(&mut ppu, 1, 0xFF, 0xFF);
    ppu.write_reg(0xFF48, 0x40); // OBP0: color 3 reads 1
    ppu.write_reg(0xFF49, 0x80); // OBP1: color 3 reads 2

    sprite(&mut ppu, 0, 16, 8, 1, 0x00); // screen 0-7
    sprite(&mut ppu, 1, 16, 12, 1, 0x10); // screen 4-11, OBP1

    ppu.write_reg(0xFF40, 0x93);
    ppu.step(456, &mut if_reg);

    assert_eq!(ppu.framebuffer[4], 1); // overlap kept from slot 0
    assert_eq!(ppu.framebuffer[8], 2); // slot 1 continues past it
}
