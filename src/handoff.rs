//! Single-instance guard and shared-memory handoff region, grounded in
//! `main.cpp::checkSingleInstance` and `DeskServer::writeSharedMemory`.
//!
//! The original creates a named 1-byte `QSharedMemory` segment purely to
//! detect a second instance, then a second, larger named segment that a
//! launcher process reads to discover the running agent's endpoint and
//! identity, bracketing the write with `m_shared.lock()`/`unlock()`
//! (`DeskServer.cpp:151,157`). This agent keeps both segments, built on the
//! `shared_memory` crate (already used elsewhere in this retrieval pack for
//! the same cross-process handoff role) instead of Qt's wrapper, with
//! `raw_sync` laid over the second segment for the same named lock.

use std::time::Duration;

use raw_sync::locks::{LockInit, Mutex as RawMutex};
use shared_memory::{ShmemConf, ShmemError};

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};

const INSTANCE_GUARD_NAME: &str = "DeskServerSharedMemory";
const HANDOFF_REGION_NAME: &str = "VVRemoteMemory";
const HANDOFF_REGION_SIZE: usize = 1024;

/// Delay before the agent is considered fully up and the handoff record is
/// written, matching the original's `QTimer::singleShot(7000, ...)` (itself
/// offset from a `singleShot(5000, ...)` auto-start) — i.e. seven seconds
/// after process start.
pub const HANDOFF_WRITE_DELAY: Duration = Duration::from_secs(7);

/// Acquire the single-instance guard. Returns `Ok(None)` if another instance
/// already holds it (the caller should exit quietly, matching the
/// original's silent `return 0`), `Ok(Some(_))` holding the guard for the
/// life of the process otherwise.
pub fn acquire_single_instance_guard(
) -> std::result::Result<Option<shared_memory::Shmem>, ShmemError> {
    match ShmemConf::new().size(1).os_id(INSTANCE_GUARD_NAME).create() {
        Ok(shmem) => Ok(Some(shmem)),
        Err(ShmemError::MappingIdExists) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write the `IP:<host>;;PORT:<port>;;UUID:<uuid>;;` handoff record into the
/// named region a launcher process reads, creating it if needed. The write
/// is bracketed by a named cross-process mutex laid over the front of the
/// segment, matching `DeskServer.cpp`'s `m_shared.lock()`/`unlock()` pair
/// around the same write (and the reader side's `shared.lock()`/`unlock()`
/// at lines 166/173) so a second process opening the segment mid-write
/// never observes a torn record.
pub fn write_handoff_record(config: &AgentConfig) -> Result<()> {
    let record = format!(
        "IP:{};;PORT:{};;UUID:{};;",
        config.server.ip, config.server.port, config.uuid
    );
    let bytes = record.as_bytes();
    if bytes.len() >= HANDOFF_REGION_SIZE {
        return Err(AgentError::Fatal(
            "handoff record exceeds region size".to_string(),
        ));
    }

    let lock_size = RawMutex::size_of(None);
    let total_size = lock_size + HANDOFF_REGION_SIZE;

    let shmem = match ShmemConf::new()
        .size(total_size)
        .os_id(HANDOFF_REGION_NAME)
        .create()
    {
        Ok(s) => s,
        Err(ShmemError::MappingIdExists) => ShmemConf::new()
            .os_id(HANDOFF_REGION_NAME)
            .open()
            .map_err(|e| AgentError::Fatal(format!("failed to open handoff region: {e}")))?,
        Err(e) => {
            return Err(AgentError::Fatal(format!(
                "failed to create handoff region: {e}"
            )))
        }
    };

    let base = shmem.as_ptr();
    let data_ptr = unsafe { base.add(lock_size) };

    let (mutex, _) = unsafe {
        if shmem.is_owner() {
            RawMutex::new(base, data_ptr)
        } else {
            RawMutex::from_existing(base, data_ptr)
        }
    }
    .map_err(|e| AgentError::Fatal(format!("failed to attach handoff mutex: {e}")))?;

    {
        let guard = mutex
            .lock()
            .map_err(|e| AgentError::Fatal(format!("failed to lock handoff region: {e}")))?;
        unsafe {
            std::ptr::write_bytes(*guard, 0, HANDOFF_REGION_SIZE);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), *guard, bytes.len());
        }
    }

    // Leak intentionally: the region must outlive this function call for the
    // duration of the process, same as the original's member-owned segment.
    std::mem::forget(shmem);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handoff_record_format_matches_contract() {
        let config = AgentConfig {
            uuid: "abc-123".to_string(),
            ..Default::default()
        };
        let record = format!(
            "IP:{};;PORT:{};;UUID:{};;",
            config.server.ip, config.server.port, config.uuid
        );
        assert!(record.starts_with("IP:"));
        assert!(record.contains(";;PORT:"));
        assert!(record.ends_with(";;"));
        assert!(record.len() < HANDOFF_REGION_SIZE);
    }
}
