//! User, producer and captcha models for authentication.
//!
//! A stored [`UserRecord`] carries the password hash and an optional producer
//! link. Once a token has been verified the caller works with a
//! [`Principal`], whose [`Role`] makes the producer extension explicit.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Producer extension of a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producer {
    pub id: Uuid,
    /// Classification tag, e.g. singer, arranger, instrumentalist.
    pub ptype: Option<String>,
    /// Honorific title.
    pub title: Option<String>,
    /// Verification note shown next to the producer name.
    pub authentication: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data submitted when a listener applies to become a producer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProducerApplication {
    pub ptype: Option<String>,
    pub title: Option<String>,
    pub authentication: Option<String>,
}

impl Producer {
    pub fn from_application(application: ProducerApplication, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ptype: application.ptype,
            title: application.title,
            authentication: application.authentication,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Role of an authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Listener,
    Producer(Producer),
}

impl Role {
    pub fn producer(&self) -> Option<&Producer> {
        match self {
            Role::Producer(producer) => Some(producer),
            Role::Listener => None,
        }
    }
}

/// Identity resolved from a verified session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
}

/// Persisted user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub producer_id: Option<Uuid>,
    pub phone: Option<String>,
    pub profile_picture_url: Option<String>,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub region: Option<String>,
    pub introduction: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Create a new listener account.
    pub fn new(username: String, email: String, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            producer_id: None,
            phone: None,
            profile_picture_url: None,
            gender: None,
            birthday: None,
            region: None,
            introduction: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build the principal for this record given its (optional) producer row.
    pub fn to_principal(&self, producer: Option<Producer>) -> Principal {
        Principal {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            role: match producer {
                Some(producer) => Role::Producer(producer),
                None => Role::Listener,
            },
        }
    }

    /// Apply a partial profile update. `None` leaves a field untouched.
    pub fn apply(&mut self, update: ProfileUpdate, now: DateTime<Utc>) {
        if let Some(username) = update.username {
            self.username = username;
        }
        if let Some(gender) = update.gender {
            self.gender = Some(gender);
        }
        if let Some(birthday) = update.birthday {
            self.birthday = Some(birthday);
        }
        if let Some(region) = update.region {
            self.region = Some(region);
        }
        if let Some(introduction) = update.introduction {
            self.introduction = Some(introduction);
        }
        self.updated_at = now;
    }
}

/// Partial update of the editable profile fields.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub region: Option<String>,
    pub introduction: Option<String>,
}

/// Public view of a user account.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub profile_picture_url: Option<String>,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub region: Option<String>,
    pub introduction: Option<String>,
    pub is_producer: bool,
    pub create_time: String,
    pub update_time: String,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            profile_picture_url: user.profile_picture_url.clone(),
            gender: user.gender.clone(),
            birthday: user.birthday,
            region: user.region.clone(),
            introduction: user.introduction.clone(),
            is_producer: user.producer_id.is_some(),
            create_time: user.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            update_time: user.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Single-use verification code tied to an email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaRecord {
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl CaptchaRecord {
    /// Exact match on both email and code, and not yet expired.
    pub fn accepts(&self, email: &str, code: &str, now: DateTime<Utc>) -> bool {
        self.email == email && self.code == code && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_principal_role_follows_producer_link() {
        let now = Utc::now();
        let user = UserRecord::new("alice".into(), "a@x.com".into(), "hash".into(), now);
        let listener = user.to_principal(None);
        assert_eq!(listener.role, Role::Listener);
        assert!(listener.role.producer().is_none());

        let producer = Producer::from_application(ProducerApplication::default(), now);
        let principal = user.to_principal(Some(producer.clone()));
        assert_eq!(principal.role.producer(), Some(&producer));
    }

    #[test]
    fn test_profile_update_keeps_unset_fields() {
        let now = Utc::now();
        let mut user = UserRecord::new("alice".into(), "a@x.com".into(), "hash".into(), now);
        user.region = Some("Shanghai".into());

        user.apply(
            ProfileUpdate {
                introduction: Some("hello".into()),
                ..Default::default()
            },
            now,
        );
        assert_eq!(user.username, "alice");
        assert_eq!(user.region.as_deref(), Some("Shanghai"));
        assert_eq!(user.introduction.as_deref(), Some("hello"));
    }

    #[test]
    fn test_captcha_accepts() {
        let now = Utc::now();
        let record = CaptchaRecord {
            email: "a@x.com".into(),
            code: "AB12CD".into(),
            expires_at: now + Duration::minutes(30),
        };
        assert!(record.accepts("a@x.com", "AB12CD", now));
        assert!(!record.accepts("b@x.com", "AB12CD", now));
        assert!(!record.accepts("a@x.com", "AB12CE", now));
        assert!(!record.accepts("a@x.com", "AB12CD", now + Duration::minutes(31)));
    }
}
