// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request validation.

use uuid::Uuid;

use crate::error::ApiError;

/// Operation names are the UUIDs minted at submission; anything else cannot
/// name a record and is rejected before the store is consulted.
pub fn validate_operation_name(name: &str) -> Result<(), ApiError> {
    Uuid::parse_str(name).map_err(|_| ApiError::InvalidArgument {
        message: "operation name must be a UUID".to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_canonical_uuids() {
        let name = Uuid::new_v4().to_string();
        assert!(validate_operation_name(&name).is_ok());
    }

    #[test]
    fn test_rejects_non_uuid_names() {
        for name in ["", "george", "123", "calculations/george"] {
            let err = validate_operation_name(name).unwrap_err();
            assert!(matches!(err, ApiError::InvalidArgument { .. }), "name: {name:?}");
        }
    }
}
