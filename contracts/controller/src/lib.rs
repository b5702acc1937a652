#![no_std]

#[cfg(test)]
extern crate std;

use soroban_sdk::xdr::ToXdr;
use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, panic_with_error, token, Address, Bytes,
    BytesN, Env, IntoVal, Symbol,
};

mod keys {
    pub const REGISTRAR: &[u8] = b"CTL_BASE";
    pub const ORACLE: &[u8] = b"CTL_ORCL";
    pub const TOKEN: &[u8] = b"CTL_TOKN";
    pub const OWNER: &[u8] = b"CTL_OWNR";
    pub const CONFIG: &[u8] = b"CTL_CONF";
    pub const COMM: &[u8] = b"CTL_COMM";
}

const MIN_NAME_LEN: u32 = 1;
const MAX_NAME_LEN: u32 = 63;

fn singleton_key(env: &Env, tag: &[u8]) -> Bytes {
    Bytes::from_slice(env, tag)
}

fn commitment_key(env: &Env, commitment: &BytesN<32>) -> Bytes {
    let mut key = Bytes::from_slice(env, keys::COMM);
    key.extend_from_array(&commitment.to_array());
    key
}

fn read_registrar(env: &Env) -> Address {
    let storage = env.storage().persistent();
    let key = singleton_key(env, keys::REGISTRAR);
    storage.get(&key).unwrap_or_else(|| {
        panic_with_error!(env, ControllerError::NotInitialized);
    })
}

fn read_oracle(env: &Env) -> Address {
    let storage = env.storage().persistent();
    let key = singleton_key(env, keys::ORACLE);
    storage.get(&key).unwrap_or_else(|| {
        panic_with_error!(env, ControllerError::NotInitialized);
    })
}

fn read_token(env: &Env) -> Address {
    let storage = env.storage().persistent();
    let key = singleton_key(env, keys::TOKEN);
    storage.get(&key).unwrap_or_else(|| {
        panic_with_error!(env, ControllerError::NotInitialized);
    })
}

fn read_owner(env: &Env) -> Address {
    let storage = env.storage().persistent();
    let key = singleton_key(env, keys::OWNER);
    storage.get(&key).unwrap_or_else(|| {
        panic_with_error!(env, ControllerError::NotInitialized);
    })
}

fn read_config(env: &Env) -> ControllerConfig {
    let storage = env.storage().persistent();
    let key = singleton_key(env, keys::CONFIG);
    storage.get(&key).unwrap_or_else(|| {
        panic_with_error!(env, ControllerError::NotInitialized);
    })
}

fn ensure_initialized(env: &Env) {
    let storage = env.storage().persistent();
    let key = singleton_key(env, keys::OWNER);
    if !storage.has(&key) {
        panic_with_error!(env, ControllerError::NotInitialized);
    }
}

fn name_ok(name: &Bytes) -> bool {
    let len = name.len();
    if len < MIN_NAME_LEN || len > MAX_NAME_LEN {
        return false;
    }
    let last_idx = (len - 1) as usize;
    for (idx, b) in name.iter().enumerate() {
        match b {
            b'a'..=b'z' | b'0'..=b'9' => {}
            b'-' if idx != 0 && idx != last_idx => {}
            _ => return false,
        }
    }
    true
}

fn validate_name(env: &Env, name: &Bytes) {
    if !name_ok(name) {
        panic_with_error!(env, ControllerError::InvalidName);
    }
}

/// Salted hash binding a future registration's name, owner, and secret. The
/// owner is part of the preimage so a reveal cannot be replayed with a
/// substituted owner.
fn compute_commitment(env: &Env, name: &Bytes, owner: &Address, secret: &Bytes) -> BytesN<32> {
    let mut data = Bytes::new(env);
    data.append(name);
    let owner_bytes = owner.clone().to_xdr(env);
    data.append(&owner_bytes);
    data.append(secret);
    env.crypto().sha256(&data).to_bytes()
}

fn name_id(env: &Env, name: &Bytes) -> BytesN<32> {
    env.crypto().sha256(name).to_bytes()
}

fn commitment_timestamp(env: &Env, commitment: &BytesN<32>) -> Option<u64> {
    let storage = env.storage().persistent();
    let key = commitment_key(env, commitment);
    storage.get(&key)
}

fn store_commitment(env: &Env, commitment: &BytesN<32>, timestamp: u64) {
    let storage = env.storage().persistent();
    let key = commitment_key(env, commitment);
    storage.set(&key, &timestamp);
}

fn remove_commitment(env: &Env, commitment: &BytesN<32>) {
    let storage = env.storage().persistent();
    let key = commitment_key(env, commitment);
    storage.remove(&key);
}

/// Charge `caller` exactly `price`; any excess of the offered value never
/// leaves the caller's account, which is what "refund the overpayment"
/// amounts to under the token model.
fn collect_payment(env: &Env, caller: &Address, price: i128) {
    if price > 0 {
        let client = token::Client::new(env, &read_token(env));
        client.transfer(caller, &env.current_contract_address(), &price);
    }
}

mod registrar_api {
    use super::*;

    pub fn register(
        env: &Env,
        registrar: &Address,
        caller: &Address,
        id: &BytesN<32>,
        owner: &Address,
        duration: u64,
    ) -> u64 {
        env.invoke_contract(
            registrar,
            &Symbol::new(env, "register"),
            (caller, id, owner, duration).into_val(env),
        )
    }

    pub fn renew(
        env: &Env,
        registrar: &Address,
        caller: &Address,
        id: &BytesN<32>,
        duration: u64,
    ) -> u64 {
        env.invoke_contract(
            registrar,
            &Symbol::new(env, "renew"),
            (caller, id, duration).into_val(env),
        )
    }

    pub fn owner_of(env: &Env, registrar: &Address, id: &BytesN<32>) -> Option<Address> {
        env.invoke_contract(
            registrar,
            &Symbol::new(env, "owner_of"),
            (id.clone(),).into_val(env),
        )
    }

    pub fn expiry_of(env: &Env, registrar: &Address, id: &BytesN<32>) -> Option<u64> {
        env.invoke_contract(
            registrar,
            &Symbol::new(env, "expiry_of"),
            (id.clone(),).into_val(env),
        )
    }
}

mod oracle_api {
    use super::*;

    pub fn price(env: &Env, oracle: &Address, duration: u64) -> i128 {
        env.invoke_contract(oracle, &Symbol::new(env, "price"), (duration,).into_val(env))
    }
}

/// Commit-reveal registration controller for the `puffs` namespace.
#[contract]
pub struct RegistrarController;

#[contracttype]
#[derive(Clone)]
pub struct ControllerConfig {
    pub min_commitment_age: u64,
    pub max_commitment_age: u64,
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum ControllerError {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    InvalidParams = 3,
    InvalidName = 4,
    InvalidDuration = 5,
    CommitmentNotFound = 6,
    CommitmentTooNew = 7,
    CommitmentTooOld = 8,
    NameUnavailable = 9,
    InsufficientValue = 10,
    Unauthorized = 11,
}

#[contracttype]
#[derive(Clone)]
pub struct EvtCommitMade {
    pub commitment: BytesN<32>,
    pub at: u64,
}

#[contracttype]
#[derive(Clone)]
pub struct EvtNameRegistered {
    pub name: Bytes,
    pub owner: Address,
    pub expires_at: u64,
}

#[contracttype]
#[derive(Clone)]
pub struct EvtNameRenewed {
    pub name: Bytes,
    pub expires_at: u64,
}

#[contractimpl]
impl RegistrarController {
    /// One-time initializer. The commitment age window is fixed here for the
    /// lifetime of the contract.
    pub fn init(
        env: Env,
        registrar: Address,
        oracle: Address,
        token: Address,
        owner: Address,
        min_commitment_age: u64,
        max_commitment_age: u64,
    ) {
        let storage = env.storage().persistent();
        let owner_key = singleton_key(&env, keys::OWNER);
        if storage.has(&owner_key) {
            panic_with_error!(&env, ControllerError::AlreadyInitialized);
        }
        if min_commitment_age >= max_commitment_age {
            panic_with_error!(&env, ControllerError::InvalidParams);
        }
        storage.set(&singleton_key(&env, keys::REGISTRAR), &registrar);
        storage.set(&singleton_key(&env, keys::ORACLE), &oracle);
        storage.set(&singleton_key(&env, keys::TOKEN), &token);
        storage.set(&owner_key, &owner);
        storage.set(
            &singleton_key(&env, keys::CONFIG),
            &ControllerConfig {
                min_commitment_age,
                max_commitment_age,
            },
        );
    }

    /// Deterministic commitment hash for a pending registration. Pure.
    pub fn make_commitment(env: Env, name: Bytes, owner: Address, secret: Bytes) -> BytesN<32> {
        compute_commitment(&env, &name, &owner, &secret)
    }

    /// Record the submission time for a commitment hash. Resubmitting the
    /// same hash overwrites the prior entry; commitments are opaque, so no
    /// ownership check happens here.
    pub fn commit(env: Env, caller: Address, commitment: BytesN<32>) {
        ensure_initialized(&env);
        caller.require_auth();
        let at = env.ledger().timestamp();
        store_commitment(&env, &commitment, at);
        env.events().publish(
            (Symbol::new(&env, "commit_made"), commitment.clone()),
            EvtCommitMade { commitment, at },
        );
    }

    /// Stored submission time for a commitment, if any.
    pub fn commitments(env: Env, commitment: BytesN<32>) -> Option<u64> {
        commitment_timestamp(&env, &commitment)
    }

    pub fn min_commitment_age(env: Env) -> u64 {
        read_config(&env).min_commitment_age
    }

    pub fn max_commitment_age(env: Env) -> u64 {
        read_config(&env).max_commitment_age
    }

    /// Stored base registrar address helper.
    pub fn registrar(env: Env) -> Address {
        ensure_initialized(&env);
        read_registrar(&env)
    }

    /// Return whether the name can currently be registered: never owned, or
    /// owned but past its expiry.
    pub fn available(env: Env, name: Bytes) -> bool {
        if !name_ok(&name) {
            return false;
        }
        if !env
            .storage()
            .persistent()
            .has(&singleton_key(&env, keys::OWNER))
        {
            return false;
        }
        let registrar = read_registrar(&env);
        let id = name_id(&env, &name);

        if registrar_api::owner_of(&env, &registrar, &id).is_none() {
            return true;
        }
        match registrar_api::expiry_of(&env, &registrar, &id) {
            Some(expires_at) => env.ledger().timestamp() > expires_at,
            None => false,
        }
    }

    /// Finalize a registration by revealing the committed parameters. The
    /// caller offers up to `value` of the payment token and is charged the
    /// oracle price for `duration`.
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        env: Env,
        caller: Address,
        name: Bytes,
        owner: Address,
        duration: u64,
        secret: Bytes,
        value: i128,
    ) -> u64 {
        ensure_initialized(&env);
        caller.require_auth();
        validate_name(&env, &name);
        if duration == 0 {
            panic_with_error!(&env, ControllerError::InvalidDuration);
        }

        let config = read_config(&env);
        let now = env.ledger().timestamp();
        let commitment = compute_commitment(&env, &name, &owner, &secret);
        let committed_at = commitment_timestamp(&env, &commitment)
            .unwrap_or_else(|| panic_with_error!(&env, ControllerError::CommitmentNotFound));
        let age = now.saturating_sub(committed_at);
        if age < config.min_commitment_age {
            panic_with_error!(&env, ControllerError::CommitmentTooNew);
        }
        if age > config.max_commitment_age {
            panic_with_error!(&env, ControllerError::CommitmentTooOld);
        }
        if !Self::available(env.clone(), name.clone()) {
            panic_with_error!(&env, ControllerError::NameUnavailable);
        }

        let price = oracle_api::price(&env, &read_oracle(&env), duration);
        if value < price {
            panic_with_error!(&env, ControllerError::InsufficientValue);
        }
        collect_payment(&env, &caller, price);

        let registrar = read_registrar(&env);
        let id = name_id(&env, &name);
        let controller_addr = env.current_contract_address();
        let expires_at =
            registrar_api::register(&env, &registrar, &controller_addr, &id, &owner, duration);

        // A consumed commitment must not authorize a second reveal; failed
        // attempts above leave it in place for a retry within the window.
        remove_commitment(&env, &commitment);

        env.events().publish(
            (Symbol::new(&env, "name_registered"), id),
            EvtNameRegistered {
                name,
                owner,
                expires_at,
            },
        );

        expires_at
    }

    /// Extend an existing registration. Anyone may pay for a renewal; the
    /// expiry grows by exactly `duration`.
    pub fn renew(env: Env, caller: Address, name: Bytes, duration: u64, value: i128) -> u64 {
        ensure_initialized(&env);
        caller.require_auth();
        validate_name(&env, &name);
        if duration == 0 {
            panic_with_error!(&env, ControllerError::InvalidDuration);
        }

        let price = oracle_api::price(&env, &read_oracle(&env), duration);
        if value < price {
            panic_with_error!(&env, ControllerError::InsufficientValue);
        }
        collect_payment(&env, &caller, price);

        let registrar = read_registrar(&env);
        let id = name_id(&env, &name);
        let controller_addr = env.current_contract_address();
        let expires_at = registrar_api::renew(&env, &registrar, &controller_addr, &id, duration);

        env.events().publish(
            (Symbol::new(&env, "name_renewed"), id),
            EvtNameRenewed { name, expires_at },
        );

        expires_at
    }

    /// Transfer the entire accrued balance to the configured owner account.
    pub fn withdraw(env: Env, caller: Address) -> i128 {
        ensure_initialized(&env);
        caller.require_auth();
        let owner = read_owner(&env);
        if caller != owner {
            panic_with_error!(&env, ControllerError::Unauthorized);
        }

        let client = token::Client::new(&env, &read_token(&env));
        let contract_addr = env.current_contract_address();
        let balance = client.balance(&contract_addr);
        if balance > 0 {
            client.transfer(&contract_addr, &owner, &balance);
        }
        balance
    }
}
