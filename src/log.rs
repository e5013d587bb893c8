//! Log writers. Out of scope for the protocol's correctness: failures here
//! are reported and swallowed rather than propagated into the simulation.

use std::{
    fs::File,
    io::Write,
    path::Path,
};

use serde::Serialize;

use crate::{message::Delivery, transport::CsRecord};

#[derive(Serialize)]
struct MessageLogRow {
    #[serde(rename = "messageType")]
    message_type: &'static str,
    #[serde(rename = "senderId")]
    sender_id: u8,
    #[serde(rename = "receiverId")]
    receiver_id: u8,
    timestamp: u64,
}

/// Write the audit log to `messageLog.csv`, one row per delivered message
/// copy. Callers should pass an already-ExtendedLamportOrder-sorted log,
/// e.g. `Transport::sorted_audit_log`.
pub fn write_message_log(path: &Path, deliveries: &[Delivery]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for delivery in deliveries {
        writer.serialize(MessageLogRow {
            message_type: delivery.kind.as_str(),
            sender_id: delivery.sender_id,
            receiver_id: delivery.receiver_id,
            timestamp: delivery.timestamp,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the critical-section operations log to `criticalSectionLog.txt`.
pub fn write_critical_section_log(path: &Path, records: &[CsRecord]) -> anyhow::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "Operations at critical section:")?;
    for record in records {
        writeln!(
            file,
            "Operation {}: Process {} changed critical int from {} to {}",
            record.operation, record.peer_id, record.before, record.after
        )?;
    }
    Ok(())
}
