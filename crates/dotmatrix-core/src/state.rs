//! Save-state serialization: a symmetric snapshot/restore of the register
//! file and the full memory image, including active bank selections.
//!
//! The format is a fixed-layout, magic-tagged byte blob. Pipeline-internal
//! PPU state (fetcher phase, FIFO contents) is not captured: `run_frame`
//! returns at frame boundaries, where the pipeline is empty by construction,
//! and that is where hosts are expected to snapshot.

use std::{error, fmt};

use crate::gameboy::GameBoy;
use crate::ppu::Mode;

const MAGIC: &[u8; 4] = b"DMST";
const VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    BadMagic,
    UnsupportedVersion(u8),
    /// Blob length does not match this machine (e.g. a different cartridge's
    /// RAM size).
    WrongLength { expected: usize, got: usize },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::BadMagic => write!(f, "not a save-state blob"),
            StateError::UnsupportedVersion(v) => write!(f, "unsupported save-state version {v}"),
            StateError::WrongLength { expected, got } => {
                write!(f, "save-state length {got} does not match machine ({expected})")
            }
        }
    }
}

impl error::Error for StateError {}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> u8 {
        let v = self.data[0];
        self.data = &self.data[1..];
        v
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes([self.u8(), self.u8()])
    }

    fn u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[..8]);
        self.data = &self.data[8..];
        u64::from_le_bytes(buf)
    }

    fn bytes(&mut self, n: usize) -> &'a [u8] {
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        head
    }
}

impl GameBoy {
    fn state_len(&self) -> usize {
        // magic + version
        5
        // cpu: 8 registers, pc, sp, ime/halted/stopped/halt_bug/ei_delay, cycles
        + 8 + 4 + 5 + 8
        // timer + serial + joypad + if/ie
        + 5 + 2 + 1 + 2
        // ppu registers + mode/dot + window latches
        + 12 + 3 + 2
        // memory blocks
        + self.mmu.wram.len()
        + self.mmu.hram.len()
        + self.mmu.ppu.vram.len()
        + self.mmu.ppu.oam.len()
        // mapper registers + external RAM
        + 4
        + self.mmu.cart.ram.len()
    }

    /// Serialize the machine into a byte blob restorable by `load_state`.
    pub fn save_state(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.state_len());
        out.extend_from_slice(MAGIC);
        out.push(VERSION);

        let regs = &self.cpu.regs;
        out.extend_from_slice(&[
            regs.a, regs.f, regs.b, regs.c, regs.d, regs.e, regs.h, regs.l,
        ]);
        out.extend_from_slice(&regs.pc.to_le_bytes());
        out.extend_from_slice(&regs.sp.to_le_bytes());
        out.extend_from_slice(&[
            self.cpu.ime as u8,
            self.cpu.halted as u8,
            self.cpu.stopped as u8,
            self.cpu.halt_bug as u8,
            self.cpu.ei_delay,
        ]);
        out.extend_from_slice(&self.cpu.cycles.to_le_bytes());

        let timer = &self.mmu.timer;
        out.extend_from_slice(&timer.counter.to_le_bytes());
        out.extend_from_slice(&[timer.tima, timer.tma, timer.tac]);
        out.extend_from_slice(&[self.mmu.serial.sb, self.mmu.serial.sc]);
        out.push(self.mmu.joypad.select);
        out.extend_from_slice(&[self.mmu.if_reg, self.mmu.ie_reg]);

        let ppu = &self.mmu.ppu;
        out.extend_from_slice(&[
            ppu.lcdc, ppu.stat, ppu.scy, ppu.scx, ppu.ly, ppu.lyc, ppu.dma, ppu.bgp, ppu.obp0,
            ppu.obp1, ppu.wy, ppu.wx,
        ]);
        out.push(ppu.mode.bits());
        out.extend_from_slice(&ppu.dot.to_le_bytes());
        out.extend_from_slice(&[ppu.window_line_hit as u8, ppu.window_line]);

        out.extend_from_slice(&self.mmu.wram);
        out.extend_from_slice(&self.mmu.hram);
        out.extend_from_slice(&ppu.vram);
        out.extend_from_slice(&ppu.oam);

        out.extend_from_slice(&self.mmu.cart.mapper_regs());
        out.extend_from_slice(&self.mmu.cart.ram);

        debug_assert_eq!(out.len(), self.state_len());
        out
    }

    /// Restore a blob produced by `save_state` on the same cartridge.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), StateError> {
        if data.len() < 5 || &data[..4] != MAGIC {
            return Err(StateError::BadMagic);
        }
        if data[4] != VERSION {
            return Err(StateError::UnsupportedVersion(data[4]));
        }
        let expected = self.state_len();
        if data.len() != expected {
            return Err(StateError::WrongLength {
                expected,
                got: data.len(),
            });
        }

        let mut r = Reader { data: &data[5..] };

        let regs = &mut self.cpu.regs;
        regs.a = r.u8();
        regs.f = r.u8() & 0xF0;
        regs.b = r.u8();
        regs.c = r.u8();
        regs.d = r.u8();
        regs.e = r.u8();
        regs.h = r.u8();
        regs.l = r.u8();
        regs.pc = r.u16();
        regs.sp = r.u16();
        self.cpu.ime = r.u8() != 0;
        self.cpu.halted = r.u8() != 0;
        self.cpu.stopped = r.u8() != 0;
        self.cpu.halt_bug = r.u8() != 0;
        self.cpu.ei_delay = r.u8();
        self.cpu.cycles = r.u64();

        let timer = &mut self.mmu.timer;
        timer.counter = r.u16();
        timer.tima = r.u8();
        timer.tma = r.u8();
        timer.tac = r.u8() & 0x07;
        timer.sync_edge();
        self.mmu.serial.sb = r.u8();
        self.mmu.serial.sc = r.u8();
        self.mmu.joypad.select = r.u8() & 0x30;
        self.mmu.if_reg = r.u8() & 0x1F;
        self.mmu.ie_reg = r.u8();

        let ppu = &mut self.mmu.ppu;
        ppu.lcdc = r.u8();
        ppu.stat = r.u8() & 0x78;
        ppu.scy = r.u8();
        ppu.scx = r.u8();
        ppu.ly = r.u8();
        ppu.lyc = r.u8();
        ppu.dma = r.u8();
        ppu.bgp = r.u8();
        ppu.obp0 = r.u8();
        ppu.obp1 = r.u8();
        ppu.wy = r.u8();
        ppu.wx = r.u8();
        ppu.mode = Mode::from_bits(r.u8());
        ppu.dot = r.u16();
        ppu.window_line_hit = r.u8() != 0;
        ppu.window_line = r.u8();

        let wram_len = self.mmu.wram.len();
        self.mmu.wram.copy_from_slice(r.bytes(wram_len));
        let hram_len = self.mmu.hram.len();
        self.mmu.hram.copy_from_slice(r.bytes(hram_len));
        let vram_len = self.mmu.ppu.vram.len();
        self.mmu.ppu.vram.copy_from_slice(r.bytes(vram_len));
        let oam_len = self.mmu.ppu.oam.len();
        self.mmu.ppu.oam.copy_from_slice(r.bytes(oam_len));

        let mut mapper = [0u8; 4];
        mapper.copy_from_slice(r.bytes(4));
        self.mmu.cart.restore_mapper_regs(mapper);
        let ram_len = self.mmu.cart.ram.len();
        self.mmu.cart.ram.copy_from_slice(r.bytes(ram_len));

        Ok(())
    }
}
