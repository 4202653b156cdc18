use tracing::info;
use uuid::Uuid;

use crate::error::AppError;

/// A per-user resource.
pub trait Owned {
    fn owner_id(&self) -> Uuid;
}

/// Rejects access unless `identity` owns `resource`. Run before every read, update,
/// delete or status change of an owned resource.
pub fn assert_owner<R: Owned>(resource: &R, identity: Uuid) -> Result<(), AppError> {
    let owner = resource.owner_id();
    if owner != identity {
        info!(%owner, requester = %identity, "ownership check failed");
        return Err(AppError::Forbidden);
    }
    Ok(())
}
