// Interrupt request/enable bits as they appear in IF (0xFF0F) and IE (0xFFFF).
pub const INT_VBLANK: u8 = 0x01;
pub const INT_STAT: u8 = 0x02;
pub const INT_TIMER: u8 = 0x04;
pub const INT_SERIAL: u8 = 0x08;
pub const INT_JOYPAD: u8 = 0x10;

/// Mask of the five implemented interrupt sources.
pub const INT_MASK: u8 = 0x1F;

// Service vectors in priority order (gbdev.io/pandocs/Interrupts.html).
const VECTORS: [(u8, u16); 5] = [
    (INT_VBLANK, 0x0040),
    (INT_STAT, 0x0048),
    (INT_TIMER, 0x0050),
    (INT_SERIAL, 0x0058),
    (INT_JOYPAD, 0x0060),
];

/// Resolve the highest-priority pending interrupt. `pending` is `IE & IF`;
/// bit 0 (VBlank) wins over all others, bit 4 (joypad) loses to all others.
pub fn next_pending(pending: u8) -> Option<(u8, u16)> {
    VECTORS
        .iter()
        .copied()
        .find(|(bit, _)| pending & bit != 0)
}

/// Set a request bit in the interrupt-flag register.
pub fn request(if_reg: &mut u8, bit: u8) {
    debug_assert_eq!(bit & !INT_MASK, 0);
    *if_reg |= bit;
}
