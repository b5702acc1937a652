#![no_std]

#[cfg(test)]
extern crate std;

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, panic_with_error, Address,
    BytesN, Env,
};

/// Events
#[derive(Clone)]
#[contractevent(topics = ["registered"])]
pub struct EvtRegistered {
    #[topic]
    pub id: BytesN<32>,
    pub owner: Address,
    pub expires_at: u64,
}

#[derive(Clone)]
#[contractevent(topics = ["renewed"])]
pub struct EvtRenewed {
    #[topic]
    pub id: BytesN<32>,
    pub expires_at: u64,
}

#[derive(Clone)]
#[contractevent(topics = ["transfer"])]
pub struct EvtTransfer {
    #[topic]
    pub id: BytesN<32>,
    pub from: Address,
    pub to: Address,
}

#[derive(Clone)]
#[contractevent(topics = ["controller_changed"])]
pub struct EvtControllerChanged {
    #[topic]
    pub controller: Address,
    pub enabled: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[contracterror]
#[repr(u32)]
pub enum RegistrarError {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotAdmin = 3,
    NotController = 4,
    NotOwner = 5,
    NameUnavailable = 6,
    NotRegistered = 7,
    NameExpired = 8,
    InvalidDuration = 9,
}

#[derive(Clone)]
#[contracttype]
enum DataKey {
    Admin,
    Controller(Address),
    Owner(BytesN<32>),
    Expires(BytesN<32>),
}

/// Base registrar for the `puffs` namespace. Owns the `id -> {owner, expiry}`
/// records; all mutation of the record set goes through accounts on the
/// controller list, managed by the admin.
#[contract]
pub struct Registrar;

impl Registrar {
    fn read_admin(env: &Env) -> Address {
        env.storage()
            .persistent()
            .get(&DataKey::Admin)
            .unwrap_or_else(|| panic_with_error!(env, RegistrarError::NotInitialized))
    }

    fn read_owner(env: &Env, id: &BytesN<32>) -> Option<Address> {
        env.storage().persistent().get(&DataKey::Owner(id.clone()))
    }

    fn read_expires(env: &Env, id: &BytesN<32>) -> Option<u64> {
        env.storage()
            .persistent()
            .get(&DataKey::Expires(id.clone()))
    }

    fn ensure_controller(env: &Env, caller: &Address) {
        // Forces the NotInitialized check before the ACL lookup.
        let _ = Self::read_admin(env);
        let allowed: bool = env
            .storage()
            .persistent()
            .get(&DataKey::Controller(caller.clone()))
            .unwrap_or(false);
        if !allowed {
            panic_with_error!(env, RegistrarError::NotController);
        }
    }

    fn ensure_admin(env: &Env, caller: &Address) {
        if Self::read_admin(env) != *caller {
            panic_with_error!(env, RegistrarError::NotAdmin);
        }
    }

    fn is_available(env: &Env, id: &BytesN<32>) -> bool {
        if Self::read_owner(env, id).is_none() {
            return true;
        }
        match Self::read_expires(env, id) {
            Some(expires_at) => env.ledger().timestamp() > expires_at,
            // An owner record without an expiry never frees up on its own.
            None => false,
        }
    }
}

#[contractimpl]
impl Registrar {
    /// One-time initializer.
    pub fn init(env: Env, admin: Address) {
        if env.storage().persistent().has(&DataKey::Admin) {
            panic_with_error!(&env, RegistrarError::AlreadyInitialized);
        }
        env.storage().persistent().set(&DataKey::Admin, &admin);
    }

    /// Grant `controller` the right to register and renew names (admin only).
    pub fn add_controller(env: Env, caller: Address, controller: Address) {
        caller.require_auth();
        Self::ensure_admin(&env, &caller);
        env.storage()
            .persistent()
            .set(&DataKey::Controller(controller.clone()), &true);
        EvtControllerChanged {
            controller,
            enabled: true,
        }
        .publish(&env);
    }

    /// Revoke a controller (admin only).
    pub fn remove_controller(env: Env, caller: Address, controller: Address) {
        caller.require_auth();
        Self::ensure_admin(&env, &caller);
        env.storage()
            .persistent()
            .remove(&DataKey::Controller(controller.clone()));
        EvtControllerChanged {
            controller,
            enabled: false,
        }
        .publish(&env);
    }

    pub fn is_controller(env: Env, controller: Address) -> bool {
        env.storage()
            .persistent()
            .get(&DataKey::Controller(controller))
            .unwrap_or(false)
    }

    /// Mint an ownership record for `duration` seconds starting now.
    /// Controller-gated; the id must be unregistered or past its expiry.
    pub fn register(
        env: Env,
        caller: Address,
        id: BytesN<32>,
        owner: Address,
        duration: u64,
    ) -> u64 {
        caller.require_auth();
        Self::ensure_controller(&env, &caller);
        if duration == 0 {
            panic_with_error!(&env, RegistrarError::InvalidDuration);
        }
        if !Self::is_available(&env, &id) {
            panic_with_error!(&env, RegistrarError::NameUnavailable);
        }

        let now = env.ledger().timestamp();
        let expires_at = now.checked_add(duration).unwrap_or(u64::MAX);
        env.storage()
            .persistent()
            .set(&DataKey::Owner(id.clone()), &owner);
        env.storage()
            .persistent()
            .set(&DataKey::Expires(id.clone()), &expires_at);

        EvtRegistered {
            id,
            owner,
            expires_at,
        }
        .publish(&env);
        expires_at
    }

    /// Extend a live registration by exactly `duration` seconds.
    /// Renewal is anchored at the current expiry, not at `now`, so renewing
    /// mid-term does not forfeit the remaining time.
    pub fn renew(env: Env, caller: Address, id: BytesN<32>, duration: u64) -> u64 {
        caller.require_auth();
        Self::ensure_controller(&env, &caller);
        if duration == 0 {
            panic_with_error!(&env, RegistrarError::InvalidDuration);
        }

        let expires_at = Self::read_expires(&env, &id)
            .unwrap_or_else(|| panic_with_error!(&env, RegistrarError::NotRegistered));
        if env.ledger().timestamp() > expires_at {
            panic_with_error!(&env, RegistrarError::NameExpired);
        }

        let new_expiry = expires_at.checked_add(duration).unwrap_or(u64::MAX);
        env.storage()
            .persistent()
            .set(&DataKey::Expires(id.clone()), &new_expiry);

        EvtRenewed {
            id,
            expires_at: new_expiry,
        }
        .publish(&env);
        new_expiry
    }

    /// Transfer a live registration to a new owner (current owner only).
    pub fn transfer(env: Env, caller: Address, id: BytesN<32>, to: Address) {
        caller.require_auth();
        let owner = Self::read_owner(&env, &id)
            .unwrap_or_else(|| panic_with_error!(&env, RegistrarError::NotRegistered));
        if owner != caller {
            panic_with_error!(&env, RegistrarError::NotOwner);
        }
        let expires_at = Self::read_expires(&env, &id)
            .unwrap_or_else(|| panic_with_error!(&env, RegistrarError::NotRegistered));
        if env.ledger().timestamp() > expires_at {
            panic_with_error!(&env, RegistrarError::NameExpired);
        }

        env.storage()
            .persistent()
            .set(&DataKey::Owner(id.clone()), &to);
        EvtTransfer {
            id,
            from: owner,
            to,
        }
        .publish(&env);
    }

    pub fn owner_of(env: Env, id: BytesN<32>) -> Option<Address> {
        Self::read_owner(&env, &id)
    }

    pub fn expiry_of(env: Env, id: BytesN<32>) -> Option<u64> {
        Self::read_expires(&env, &id)
    }

    /// True when the id has no owner record or its expiry has passed.
    pub fn available(env: Env, id: BytesN<32>) -> bool {
        Self::is_available(&env, &id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soroban_sdk::{
        testutils::{Address as _, Ledger},
        Address, BytesN, Env,
    };
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn setup() -> (Env, RegistrarClient<'static>, Address, Address) {
        let env = Env::default();
        let contract_id = env.register(Registrar, ());
        let client = RegistrarClient::new(&env, &contract_id);
        let admin = Address::generate(&env);
        client.init(&admin);
        env.mock_all_auths();
        let controller = Address::generate(&env);
        client.add_controller(&admin, &controller);
        (env, client, admin, controller)
    }

    fn name_id(env: &Env, seed: u8) -> BytesN<32> {
        BytesN::from_array(env, &[seed; 32])
    }

    #[test]
    fn init_only_once() {
        let (_env, client, admin, _) = setup();
        let second = catch_unwind(AssertUnwindSafe(|| {
            client.init(&admin);
        }));
        assert!(second.is_err());
    }

    #[test]
    fn controller_list_admin_gated() {
        let (env, client, admin, controller) = setup();
        assert!(client.is_controller(&controller));

        let outsider = Address::generate(&env);
        let grant = catch_unwind(AssertUnwindSafe(|| {
            client.add_controller(&outsider, &outsider);
        }));
        assert!(grant.is_err());
        assert!(!client.is_controller(&outsider));

        client.remove_controller(&admin, &controller);
        assert!(!client.is_controller(&controller));
    }

    #[test]
    fn register_requires_controller() {
        let (env, client, _, _) = setup();
        let outsider = Address::generate(&env);
        let owner = Address::generate(&env);
        let id = name_id(&env, 1);
        let attempt = catch_unwind(AssertUnwindSafe(|| {
            client.register(&outsider, &id, &owner, &86_400);
        }));
        assert!(attempt.is_err());
        assert!(client.owner_of(&id).is_none());
    }

    #[test]
    fn register_lifecycle() {
        let (env, client, _, controller) = setup();
        env.ledger().set_timestamp(1_000);
        let owner = Address::generate(&env);
        let id = name_id(&env, 2);

        assert!(client.available(&id));
        let expires_at = client.register(&controller, &id, &owner, &86_400);
        assert_eq!(expires_at, 1_000 + 86_400);
        assert_eq!(client.owner_of(&id), Some(owner.clone()));
        assert_eq!(client.expiry_of(&id), Some(expires_at));
        assert!(!client.available(&id));

        // Still taken at the expiry instant, free one second later.
        env.ledger().set_timestamp(expires_at);
        assert!(!client.available(&id));
        env.ledger().set_timestamp(expires_at + 1);
        assert!(client.available(&id));

        let next_owner = Address::generate(&env);
        let new_expiry = client.register(&controller, &id, &next_owner, &86_400);
        assert_eq!(new_expiry, expires_at + 1 + 86_400);
        assert_eq!(client.owner_of(&id), Some(next_owner));
    }

    #[test]
    fn register_taken_id_rejected() {
        let (env, client, _, controller) = setup();
        env.ledger().set_timestamp(5_000);
        let owner = Address::generate(&env);
        let id = name_id(&env, 3);
        client.register(&controller, &id, &owner, &86_400);

        let challenger = Address::generate(&env);
        let attempt = catch_unwind(AssertUnwindSafe(|| {
            client.register(&controller, &id, &challenger, &86_400);
        }));
        assert!(attempt.is_err());
        assert_eq!(client.owner_of(&id), Some(owner));
    }

    #[test]
    fn zero_duration_rejected() {
        let (env, client, _, controller) = setup();
        let owner = Address::generate(&env);
        let id = name_id(&env, 4);
        let attempt = catch_unwind(AssertUnwindSafe(|| {
            client.register(&controller, &id, &owner, &0);
        }));
        assert!(attempt.is_err());
    }

    #[test]
    fn renew_extends_from_current_expiry() {
        let (env, client, _, controller) = setup();
        env.ledger().set_timestamp(10_000);
        let owner = Address::generate(&env);
        let id = name_id(&env, 5);
        let expires_at = client.register(&controller, &id, &owner, &86_400);

        env.ledger().set_timestamp(10_500);
        let renewed = client.renew(&controller, &id, &3_600);
        assert_eq!(renewed, expires_at + 3_600);
        assert_eq!(client.expiry_of(&id), Some(renewed));
    }

    #[test]
    fn renew_unregistered_or_expired_rejected() {
        let (env, client, _, controller) = setup();
        env.ledger().set_timestamp(20_000);
        let id = name_id(&env, 6);
        let missing = catch_unwind(AssertUnwindSafe(|| {
            client.renew(&controller, &id, &3_600);
        }));
        assert!(missing.is_err());

        let owner = Address::generate(&env);
        let expires_at = client.register(&controller, &id, &owner, &3_600);
        env.ledger().set_timestamp(expires_at + 1);
        let expired = catch_unwind(AssertUnwindSafe(|| {
            client.renew(&controller, &id, &3_600);
        }));
        assert!(expired.is_err());
    }

    #[test]
    fn transfer_owner_only_and_live_only() {
        let (env, client, _, controller) = setup();
        env.ledger().set_timestamp(30_000);
        let owner = Address::generate(&env);
        let recipient = Address::generate(&env);
        let id = name_id(&env, 7);
        let expires_at = client.register(&controller, &id, &owner, &86_400);

        let stranger = Address::generate(&env);
        let stolen = catch_unwind(AssertUnwindSafe(|| {
            client.transfer(&stranger, &id, &stranger);
        }));
        assert!(stolen.is_err());

        client.transfer(&owner, &id, &recipient);
        assert_eq!(client.owner_of(&id), Some(recipient.clone()));

        env.ledger().set_timestamp(expires_at + 1);
        let late = catch_unwind(AssertUnwindSafe(|| {
            client.transfer(&recipient, &id, &owner);
        }));
        assert!(late.is_err());
    }
}
