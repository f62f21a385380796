//! Process-wide compute device selection.
//!
//! This state is global and unlocked with respect to in-flight engine calls:
//! switching devices while another call is executing is a caller error. The
//! lock below only keeps the state itself consistent.

use parking_lot::RwLock;

use crate::error::{EngineErr, Result};

/// Compute mode for all subsequently created objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Cpu,
    Gpu,
}

#[derive(Debug, Clone)]
struct DeviceState {
    mode: Mode,
    devices: Vec<i32>,
    current: i32,
}

static STATE: RwLock<DeviceState> = RwLock::new(DeviceState {
    mode: Mode::Cpu,
    devices: Vec::new(),
    current: 0,
});

pub fn set_mode(mode: Mode) {
    STATE.write().mode = mode;
}

pub fn mode() -> Mode {
    STATE.read().mode
}

/// Selects the active device by its raw id.
pub fn set_device(id: i32) {
    STATE.write().current = id;
}

pub fn current_device() -> i32 {
    STATE.read().current
}

/// Replaces the set of devices available to `select_device`.
pub fn set_devices(ids: &[i32]) {
    STATE.write().devices = ids.to_vec();
}

/// Selects a device either by raw id or by index into the configured list.
pub fn select_device(id: usize, by_list_index: bool) -> Result<()> {
    let mut state = STATE.write();
    if by_list_index {
        let len = state.devices.len();
        let raw = *state
            .devices
            .get(id)
            .ok_or(EngineErr::DeviceIndex { index: id, len })?;
        state.current = raw;
    } else {
        state.current = id as i32;
    }
    Ok(())
}

/// Human-readable descriptors for every visible device.
pub fn enumerate_devices() -> Vec<String> {
    let state = STATE.read();
    let mut out = vec!["cpu".to_string()];
    out.extend(state.devices.iter().map(|id| format!("gpu:{id}")));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_by_list_index_uses_configured_ids() {
        set_devices(&[3, 7]);
        select_device(1, true).unwrap();
        assert_eq!(current_device(), 7);
        assert!(matches!(
            select_device(5, true),
            Err(EngineErr::DeviceIndex { index: 5, len: 2 })
        ));
    }
}
