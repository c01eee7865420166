//! End-to-end acceptance: blargg's CPU-correctness suite streams its report
//! through the serial registers; the full run must come back "Passed".

mod common;

use dotmatrix_core::gameboy::GameBoy;
use dotmatrix_core::joypad::Buttons;

/// Run a serial-reporting ROM until it prints a pass/fail marker.
fn run_serial_rom(path: &str, max_frames: u32) -> String {
    let rom = std::fs::read(common::rom_path(path)).expect("rom not found");
    let mut gb = GameBoy::new(rom).expect("rom should load");

    let mut output = Vec::new();
    let mut checked_up_to = 0usize;
    for _ in 0..max_frames {
        let _ = gb.run_frame(Buttons::default());
        output.extend(gb.take_serial());
        if common::serial_contains_result(&output, &mut checked_up_to) {
            break;
        }
    }
    String::from_utf8_lossy(&output).into_owned()
}

#[test]
fn cpu_instrs_passes() {
    let output = run_serial_rom("blargg/cpu_instrs/cpu_instrs.gb", 4000);
    assert!(
        output.contains("Passed"),
        "cpu_instrs did not pass:\n{output}"
    );
    assert!(!output.contains("Failed"), "cpu_instrs failed:\n{output}");
}

#[test]
fn instr_timing_passes() {
    let output = run_serial_rom("blargg/instr_timing/instr_timing.gb", 600);
    assert!(
        output.contains("Passed"),
        "instr_timing did not pass:\n{output}"
    );
    assert!(!output.contains("Failed"), "instr_timing failed:\n{output}");
}
