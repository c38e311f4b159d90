//! Ownership checks for order access. Reads are open to the owner and admins;
//! mutations are open to the owner only.

use uuid::Uuid;

use super::AuthUser;
use crate::errors::ServiceError;

pub fn can_view(order_owner: Uuid, caller: &AuthUser) -> bool {
    caller.user_id == order_owner || caller.is_admin()
}

pub fn can_mutate(order_owner: Uuid, caller: &AuthUser) -> bool {
    caller.user_id == order_owner
}

pub fn ensure_can_view(order_owner: Uuid, caller: &AuthUser) -> Result<(), ServiceError> {
    if can_view(order_owner, caller) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "You are not allowed to view this order".to_string(),
        ))
    }
}

pub fn ensure_can_mutate(order_owner: Uuid, caller: &AuthUser) -> Result<(), ServiceError> {
    if can_mutate(order_owner, caller) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "Only the order owner may perform this action".to_string(),
        ))
    }
}

pub fn ensure_admin(caller: &AuthUser) -> Result<(), ServiceError> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("Admin access required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn owner_can_view_and_mutate() {
        let owner = Uuid::new_v4();
        let caller = AuthUser::customer(owner);
        assert!(can_view(owner, &caller));
        assert!(can_mutate(owner, &caller));
    }

    #[test]
    fn admin_can_view_but_not_mutate_foreign_order() {
        let owner = Uuid::new_v4();
        let admin = AuthUser::admin(Uuid::new_v4());
        assert!(can_view(owner, &admin));
        assert!(!can_mutate(owner, &admin));
        assert_matches!(ensure_can_mutate(owner, &admin), Err(ServiceError::Forbidden(_)));
    }

    #[test]
    fn stranger_is_forbidden() {
        let owner = Uuid::new_v4();
        let stranger = AuthUser::customer(Uuid::new_v4());
        assert_matches!(ensure_can_view(owner, &stranger), Err(ServiceError::Forbidden(_)));
        assert_matches!(ensure_admin(&stranger), Err(ServiceError::Forbidden(_)));
        assert!(ensure_admin(&AuthUser::admin(owner)).is_ok());
    }
}
