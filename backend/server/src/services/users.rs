use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{hash_password, verify_password},
    database::{Database, users},
    error::AppError,
    models::{AccessRole, CooperativeRole, User},
    utils::{check_email, check_length},
};

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub password: String,
    pub password_repeat: String,
}

/// Fields a user may change on their own account.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password: Option<String>,
    pub password_repeat: Option<String>,
}

pub fn check_password(password: &str, repeat: &str) -> Result<(), AppError> {
    check_length("password", password, 8, 100)?;

    if password != repeat {
        return Err(AppError::Validation("Passwords do not match".into()));
    }

    Ok(())
}

fn check_name(field: &str, value: &str) -> Result<(), AppError> {
    check_length(field, value, 3, 100)
}

impl Registration {
    pub fn validate(&self) -> Result<(), AppError> {
        check_name("first_name", &self.first_name)?;
        if let Some(middle) = self.middle_name.as_deref().filter(|m| !m.trim().is_empty()) {
            check_name("middle_name", middle)?;
        }
        check_name("last_name", &self.last_name)?;
        check_email(&self.email)?;
        check_length("phone", &self.phone, 1, 15)?;
        check_length("address", &self.address, 1, 255)?;
        check_password(&self.password, &self.password_repeat)
    }
}

/// Validates and stores a new account with the given access roles.
pub fn register(
    database: &Database,
    registration: &Registration,
    access_roles: Vec<AccessRole>,
    rounds: u32,
) -> Result<User, AppError> {
    registration.validate()?;

    let now = ledger::now();
    let user = User {
        id: Uuid::new_v4(),
        first_name: registration.first_name.trim().to_string(),
        middle_name: registration
            .middle_name
            .as_deref()
            .map(str::trim)
            .filter(|middle| !middle.is_empty())
            .map(str::to_string),
        last_name: registration.last_name.trim().to_string(),
        email: registration.email.trim().to_string(),
        phone: registration.phone.trim().to_string(),
        address: registration.address.trim().to_string(),
        password_hash: hash_password(&registration.password, rounds),
        access_roles,
        cooperative_roles: vec![CooperativeRole::Member],
        disabled: false,
        is_verified: false,
        joined_at: now,
        updated_at: now,
    };

    database.write(|transaction| {
        if users::find_by_email(transaction, &user.email)?.is_some() {
            return Err(AppError::BadRequest(
                "The user with this email already exists".into(),
            ));
        }

        users::insert(transaction, &user)
    })?;

    info!(user_id = %user.id, "User registered");

    Ok(user)
}

/// Wrong email and wrong password look the same to the caller.
pub fn authenticate(database: &Database, email: &str, password: &str) -> Result<User, AppError> {
    let user = database
        .read(|connection| users::find_by_email(connection, email.trim()))?
        .filter(|user| verify_password(password, &user.password_hash))
        .ok_or(AppError::Unauthorized("Incorrect email or password"))?;

    if user.disabled {
        return Err(AppError::Forbidden("Inactive user"));
    }

    Ok(user)
}

pub fn update_profile(
    database: &Database,
    mut user: User,
    update: &ProfileUpdate,
    rounds: u32,
) -> Result<User, AppError> {
    if let Some(first_name) = &update.first_name {
        check_name("first_name", first_name)?;
        user.first_name = first_name.trim().to_string();
    }
    if let Some(middle_name) = &update.middle_name {
        let middle_name = middle_name.trim();
        if middle_name.is_empty() {
            user.middle_name = None;
        } else {
            check_name("middle_name", middle_name)?;
            user.middle_name = Some(middle_name.to_string());
        }
    }
    if let Some(last_name) = &update.last_name {
        check_name("last_name", last_name)?;
        user.last_name = last_name.trim().to_string();
    }
    if let Some(phone) = &update.phone {
        check_length("phone", phone, 1, 15)?;
        user.phone = phone.trim().to_string();
    }
    if let Some(address) = &update.address {
        check_length("address", address, 1, 255)?;
        user.address = address.trim().to_string();
    }
    if let Some(password) = &update.password {
        check_password(password, update.password_repeat.as_deref().unwrap_or_default())?;
        user.password_hash = hash_password(password, rounds);
    }

    user.updated_at = ledger::now();
    database.write(|transaction| users::update(transaction, &user))?;

    Ok(user)
}

pub fn set_password(
    database: &Database,
    user_id: Uuid,
    password: &str,
    rounds: u32,
) -> Result<(), AppError> {
    let password_hash = hash_password(password, rounds);

    database.write(|transaction| {
        let mut user = users::find_by_id(transaction, user_id)?.ok_or(AppError::NotFound("User"))?;
        user.password_hash = password_hash;
        user.updated_at = ledger::now();
        users::update(transaction, &user)
    })
}

/// Creates the bootstrap admin unless an account with that email exists.
pub fn ensure_superuser(
    database: &Database,
    email: &str,
    password: &str,
    rounds: u32,
) -> Result<Option<User>, AppError> {
    if database
        .read(|connection| users::find_by_email(connection, email))?
        .is_some()
    {
        return Ok(None);
    }

    let registration = Registration {
        first_name: "Yugantar".into(),
        middle_name: None,
        last_name: "Admin".into(),
        email: email.to_string(),
        phone: "0000000000".into(),
        address: "Yugantar".into(),
        password: password.to_string(),
        password_repeat: password.to_string(),
    };

    let mut admin = register(
        database,
        &registration,
        vec![AccessRole::User, AccessRole::Admin],
        rounds,
    )?;

    admin.is_verified = true;
    database.write(|transaction| users::update(transaction, &admin))?;

    info!(email, "Superuser created");

    Ok(Some(admin))
}

/// Admin actions never apply to the admin's own account.
pub fn ensure_not_self(admin: &User, target: Uuid) -> Result<(), AppError> {
    if admin.id == target {
        return Err(AppError::BadRequest(
            "Admins cannot perform this action on themselves".into(),
        ));
    }

    Ok(())
}
