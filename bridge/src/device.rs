//! Process-wide device configuration, forwarded to the engine.
//!
//! These calls are not transactional with in-flight engine calls: switching
//! devices while a forward pass runs on another thread races with it.
//! Callers must fence device switches against other boundary calls.

use crate::error::Result;

pub use engine::device::Mode;

pub fn set_mode_cpu() {
    engine::device::set_mode(Mode::Cpu);
}

pub fn set_mode_gpu() {
    engine::device::set_mode(Mode::Gpu);
}

pub fn set_mode(mode: Mode) {
    engine::device::set_mode(mode);
}

pub fn mode() -> Mode {
    engine::device::mode()
}

pub fn set_device(id: i32) {
    engine::device::set_device(id);
}

pub fn set_devices(ids: &[i32]) {
    engine::device::set_devices(ids);
}

/// Selects a device by raw id, or by index into the configured list when
/// `by_list_index` is set.
pub fn select_device(id: usize, by_list_index: bool) -> Result<()> {
    engine::device::select_device(id, by_list_index)?;
    Ok(())
}

pub fn enumerate_devices() -> Vec<String> {
    engine::device::enumerate_devices()
}
