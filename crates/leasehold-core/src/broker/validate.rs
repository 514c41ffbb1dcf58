use std::time::Duration;

use crate::error::ValidationError;

/// Consumer ids are stored in an indexed column; keep them short.
pub const MAX_CONSUMER_ID_BYTES: usize = 255;

pub(crate) fn payload(payload: &str, max_bytes: usize) -> Result<(), ValidationError> {
    if payload.trim().is_empty() {
        return Err(ValidationError::EmptyPayload);
    }
    if payload.len() > max_bytes {
        return Err(ValidationError::PayloadTooLarge {
            len: payload.len(),
            max: max_bytes,
        });
    }
    Ok(())
}

pub(crate) fn consumer_id(consumer_id: &str) -> Result<(), ValidationError> {
    if consumer_id.is_empty() {
        return Err(ValidationError::EmptyConsumerId);
    }
    if consumer_id.len() > MAX_CONSUMER_ID_BYTES {
        return Err(ValidationError::ConsumerIdTooLong {
            len: consumer_id.len(),
            max: MAX_CONSUMER_ID_BYTES,
        });
    }
    Ok(())
}

pub(crate) fn count(count: u32, max: u32) -> Result<(), ValidationError> {
    match count {
        0 => Err(ValidationError::ZeroCount),
        n if n > max => Err(ValidationError::CountTooLarge { requested: n, max }),
        _ => Ok(()),
    }
}

/// Sub-millisecond leases round down to zero and are rejected with it.
pub(crate) fn lease(lease: Duration, max_ms: u64) -> Result<(), ValidationError> {
    let requested_ms = u64::try_from(lease.as_millis()).unwrap_or(u64::MAX);
    if requested_ms == 0 {
        return Err(ValidationError::ZeroLease);
    }
    if requested_ms > max_ms {
        return Err(ValidationError::LeaseTooLong {
            requested_ms,
            max_ms,
        });
    }
    Ok(())
}
