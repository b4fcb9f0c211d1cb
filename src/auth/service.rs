//! Account operations: registration, login, password change, token refresh,
//! the producer upgrade and the user's own profile.

use crate::auth::captcha::CaptchaService;
use crate::auth::guard::require_producer;
use crate::auth::jwt::TokenCodec;
use crate::auth::models::{
    Principal, Producer, ProducerApplication, ProfileUpdate, UserProfile, UserRecord,
};
use crate::auth::password::PasswordService;
use crate::clock::Clock;
use crate::database::UserRepository;
use crate::errors::AppError;
use crate::response::ApiResult;
use crate::upload::{MediaUploader, UploadedFile, IMAGE_EXTENSIONS, PROFILE_PHOTO_FOLDER};
use crate::validation::require_email;
use std::sync::Arc;

const LOGIN_FAILED: &str = "Email or Password is incorrect";

/// Fields of a registration request.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub captcha: String,
}

/// Fields of a password change request.
#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub email: String,
    pub old_password: String,
    pub new_password: String,
    pub captcha: String,
}

pub struct AccountService {
    users: Arc<dyn UserRepository>,
    captcha: Arc<CaptchaService>,
    codec: Arc<TokenCodec>,
    passwords: PasswordService,
    uploader: Arc<MediaUploader>,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        captcha: Arc<CaptchaService>,
        codec: Arc<TokenCodec>,
        uploader: Arc<MediaUploader>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            captcha,
            codec,
            passwords: PasswordService::new(),
            uploader,
            clock,
        }
    }

    pub async fn exist_email(&self, email: &str) -> ApiResult<bool> {
        require_email(email)?;
        Ok(self.users.email_exists(email).await?)
    }

    pub async fn exist_username(&self, username: &str) -> ApiResult<bool> {
        Ok(self.users.username_exists(username).await?)
    }

    /// Register a listener account and return its first session token.
    ///
    /// The captcha is consumed before anything else is checked, so a failed
    /// registration still burns it.
    pub async fn register(&self, registration: Registration) -> ApiResult<String> {
        self.captcha
            .consume(&registration.email, &registration.captcha)
            .await?;
        self.passwords
            .validate_password_strength(&registration.password)?;

        if self.users.email_exists(&registration.email).await? {
            return Err(AppError::conflict("Email has been registered"));
        }

        let hash = self.passwords.hash_password(&registration.password)?;
        let user = UserRecord::new(
            registration.username,
            registration.email,
            hash,
            self.clock.now(),
        );
        let principal = user.to_principal(None);
        // The store's unique email constraint settles concurrent registrations
        self.users.insert_user(user).await?;

        tracing::info!("Registered user {} <{}>", principal.id, principal.email);
        Ok(self.codec.issue(&principal)?)
    }

    /// Exchange email and password for a session token. Unknown email and
    /// wrong password are indistinguishable.
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<String> {
        let user = match self.users.find_user_by_email(email).await? {
            Some(user) => user,
            None => return Err(AppError::not_acceptable(LOGIN_FAILED)),
        };
        if !self.passwords.verify_password(password, &user.password_hash)? {
            tracing::debug!("Password mismatch for {}", email);
            return Err(AppError::not_acceptable(LOGIN_FAILED));
        }

        let principal = self
            .users
            .find_principal(user.id, &user.email)
            .await?
            .ok_or_else(|| AppError::not_acceptable(LOGIN_FAILED))?;
        Ok(self.codec.issue(&principal)?)
    }

    pub async fn change_password(&self, change: PasswordChange) -> ApiResult<()> {
        self.passwords
            .validate_password_strength(&change.new_password)?;
        self.captcha.consume(&change.email, &change.captcha).await?;

        let mut user = self
            .users
            .find_user_by_email(&change.email)
            .await?
            .ok_or_else(|| AppError::not_acceptable("No such user in database"))?;
        if !self
            .passwords
            .verify_password(&change.old_password, &user.password_hash)?
        {
            return Err(AppError::not_acceptable("No such user in database"));
        }

        user.password_hash = self.passwords.hash_password(&change.new_password)?;
        user.updated_at = self.clock.now();
        self.users.update_user(&user).await?;

        tracing::info!("Password changed for user {}", user.id);
        Ok(())
    }

    /// Fresh token for an already authenticated principal.
    pub fn refresh(&self, principal: &Principal) -> ApiResult<String> {
        Ok(self.codec.issue(principal)?)
    }

    /// Upgrade a listener to a producer. Irreversible; a second application
    /// is a conflict.
    pub async fn apply_producer(
        &self,
        principal: &Principal,
        application: ProducerApplication,
    ) -> ApiResult<Producer> {
        if principal.role.producer().is_some() {
            return Err(AppError::conflict("producer has been register"));
        }

        let producer = Producer::from_application(application, self.clock.now());
        self.users
            .attach_producer(principal.id, producer.clone())
            .await?;

        tracing::info!("User {} became producer {}", principal.id, producer.id);
        Ok(producer)
    }

    pub fn producer<'a>(&self, principal: &'a Principal) -> ApiResult<&'a Producer> {
        require_producer(principal)
    }

    /// Public producer lookup.
    pub async fn producer_by_id(&self, producer_id: uuid::Uuid) -> ApiResult<Producer> {
        self.users
            .find_producer(producer_id)
            .await?
            .ok_or(AppError::NotFound("producer"))
    }

    pub async fn profile(&self, principal: &Principal) -> ApiResult<UserProfile> {
        let user = self.current_user(principal).await?;
        Ok(UserProfile::from(&user))
    }

    pub async fn edit_profile(
        &self,
        principal: &Principal,
        update: ProfileUpdate,
    ) -> ApiResult<UserProfile> {
        let mut user = self.current_user(principal).await?;
        user.apply(update, self.clock.now());
        self.users.update_user(&user).await?;
        Ok(UserProfile::from(&user))
    }

    /// Store a new profile picture and return its URL.
    pub async fn set_profile_picture(
        &self,
        principal: &Principal,
        file: &UploadedFile,
    ) -> ApiResult<String> {
        let url = self
            .uploader
            .store(file, IMAGE_EXTENSIONS, PROFILE_PHOTO_FOLDER)
            .await?;

        let mut user = self.current_user(principal).await?;
        user.profile_picture_url = Some(url.clone());
        user.updated_at = self.clock.now();
        self.users.update_user(&user).await?;
        Ok(url)
    }

    async fn current_user(&self, principal: &Principal) -> ApiResult<UserRecord> {
        self.users
            .find_user(principal.id)
            .await?
            .ok_or(AppError::NotFound("user"))
    }
}
