//! Credential lifecycle: signup and email verification, login, password change,
//! forgot/reset password and session authorization.
//!
//! The service owns no state of its own. Users live behind [`UserStore`], mail goes
//! out through [`Mailer`] on a spawned task, and one-time tokens only ever touch the
//! store as SHA-256 digests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use validator::Validate;

use crate::auth::token::{digest, JwtKeys, OneTimeToken};
use crate::auth::{
    normalize_email, AdminCreateUser, ChangePasswordRequest, CurrentUser, EmailRequest, LinkSent,
    LoginRequest, PasswordHasher, ResetPasswordRequest, SignupRequest,
};
use crate::error::AppError;
use crate::mail::{self, Email, EmailKind, Mailer};
use crate::models::{NewUser, PendingToken, Role, User};
use crate::store::{TokenIssue, TokenPurpose, UserStore};

const BAD_CREDENTIALS: &str = "Please provide correct email and password";

/// Lifetimes and link base for one-time tokens.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub one_time_ttl: Duration,
    /// A pending token may be replaced once at most this much of its life is left.
    pub resend_window: Duration,
    /// Base of the links sent by email.
    pub app_url: String,
}

/// A freshly issued session token and the account it belongs to.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    hasher: PasswordHasher,
    keys: JwtKeys,
    settings: TokenSettings,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        hasher: PasswordHasher,
        keys: JwtKeys,
        settings: TokenSettings,
    ) -> Self {
        Self {
            store,
            mailer,
            hasher,
            keys,
            settings,
        }
    }

    /// Lifetime of session tokens, also used for the session cookie.
    pub fn session_ttl(&self) -> Duration {
        self.keys.ttl()
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::InternalServerError(format!("Hashing task failed: {}", e)))?
    }

    async fn password_matches(&self, password: String, hashed: String) -> Result<bool, AppError> {
        let hasher = self.hasher;
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hashed))
            .await
            .map_err(|e| AppError::InternalServerError(format!("Hashing task failed: {}", e)))?
    }

    fn link(&self, route: &str, token: &str) -> String {
        format!(
            "{}/users/{}/{}",
            self.settings.app_url.trim_end_matches('/'),
            route,
            token
        )
    }

    fn open_session(&self, user: User) -> Result<Session, AppError> {
        let token = self.keys.issue(user.id)?;
        Ok(Session { token, user })
    }

    /// Rotates the one-time token for `purpose`, subject to the resend cool-down.
    /// Returns the plaintext token for the link.
    async fn rotate_token(&self, user: &User, purpose: TokenPurpose) -> Result<String, AppError> {
        let token = OneTimeToken::generate();
        let now = Utc::now();
        let reissue_after = now + self.settings.resend_window;

        match self
            .store
            .issue_token(
                user.id,
                purpose,
                &token.digest,
                now + self.settings.one_time_ttl,
                reissue_after,
            )
            .await?
        {
            TokenIssue::Issued => Ok(token.plain),
            TokenIssue::Pending { expires_at } => {
                let wait = (expires_at - reissue_after).num_seconds().max(1);
                Err(AppError::TooManyRequests(format!(
                    "Please wait {} seconds before resending the link again.",
                    wait
                )))
            }
            TokenIssue::Missing => Err(AppError::NotFound(
                "There is no user with that email address".into(),
            )),
        }
    }

    async fn find_for_link(&self, request: EmailRequest) -> Result<User, AppError> {
        let request = EmailRequest {
            email: normalize_email(&request.email),
        };
        request.validate()?;

        self.store
            .find_by_email(&request.email)
            .await?
            .ok_or_else(|| AppError::NotFound("There is no user with that email address".into()))
    }

    /// Creates an unverified account and mails the verification link.
    pub async fn signup(&self, mut request: SignupRequest) -> Result<LinkSent, AppError> {
        request.email = normalize_email(&request.email);
        request.validate()?;

        let password_hash = self.hash_password(request.password).await?;
        let token = OneTimeToken::generate();
        let user = self
            .store
            .create(NewUser {
                name: request.name.trim().to_string(),
                email: request.email,
                gender: request.gender,
                country: request.country.trim().to_string(),
                image: request.image,
                role: Role::User,
                verified: false,
                password_hash,
                verification: Some(PendingToken {
                    digest: token.digest,
                    expires_at: Utc::now() + self.settings.one_time_ttl,
                }),
            })
            .await?;
        log::info!("User {} signed up, awaiting verification", user.id);

        let url = self.link("verify-user", &token.plain);
        mail::dispatch(
            self.mailer.clone(),
            Email::new(&user.email, &user.name, EmailKind::Verification { url: url.clone() }),
        );

        Ok(LinkSent {
            message: "Verification link sent to your email".into(),
            url,
        })
    }

    pub async fn resend_verification(&self, request: EmailRequest) -> Result<LinkSent, AppError> {
        let user = self.find_for_link(request).await?;
        if user.verified {
            return Err(AppError::ValidationError(
                "This account is already verified".into(),
            ));
        }

        let plain = self.rotate_token(&user, TokenPurpose::Verification).await?;
        let url = self.link("verify-user", &plain);
        mail::dispatch(
            self.mailer.clone(),
            Email::new(&user.email, &user.name, EmailKind::Verification { url: url.clone() }),
        );

        Ok(LinkSent {
            message: "Verification link sent to your email".into(),
            url,
        })
    }

    /// Redeems a verification token and logs the account in.
    pub async fn verify_account(&self, token: &str) -> Result<Session, AppError> {
        let user = self
            .store
            .redeem_verification(&digest(token), Utc::now())
            .await?
            .ok_or_else(|| AppError::InvalidToken("Token is invalid or has expired".into()))?;
        log::info!("User {} verified their email", user.id);

        mail::dispatch(
            self.mailer.clone(),
            Email::new(&user.email, &user.name, EmailKind::Welcome),
        );
        self.open_session(user)
    }

    /// Every failure mode yields the same 401 so the response does not reveal which
    /// factor was wrong.
    pub async fn login(&self, request: LoginRequest) -> Result<Session, AppError> {
        let bad_credentials = || AppError::Unauthorized(BAD_CREDENTIALS.into());

        let (email, password) = match (request.email, request.password) {
            (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
                (normalize_email(&email), password)
            }
            _ => return Err(bad_credentials()),
        };

        let user = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or_else(bad_credentials)?;
        if !self
            .password_matches(password, user.password_hash.clone())
            .await?
        {
            log::debug!("Login for {} rejected: wrong password", user.id);
            return Err(bad_credentials());
        }
        if !user.verified {
            log::debug!("Login for {} rejected: not verified", user.id);
            return Err(bad_credentials());
        }

        log::info!("User {} logged in", user.id);
        self.open_session(user)
    }

    /// Resolves a session token to the acting user.
    pub async fn authorize(&self, token: &str) -> Result<CurrentUser, AppError> {
        let claims = self.keys.verify(token)?;

        let user = self
            .store
            .find_by_id(claims.sub, None)
            .await?
            .ok_or_else(|| {
                AppError::Unauthorized("The user belonging to this token no longer exists".into())
            })?;

        if user.changed_password_after(claims.iat_micros) {
            return Err(AppError::Unauthorized(
                "User recently changed password! Please log in again.".into(),
            ));
        }

        Ok(CurrentUser::from(user))
    }

    pub async fn change_password(
        &self,
        actor: &CurrentUser,
        request: ChangePasswordRequest,
    ) -> Result<Session, AppError> {
        request.validate()?;

        if !self
            .password_matches(request.current_password, actor.user.password_hash.clone())
            .await?
        {
            return Err(AppError::Unauthorized("Incorrect current password".into()));
        }

        let password_hash = self.hash_password(request.new_password).await?;
        let user = self
            .store
            .set_password(actor.id, &password_hash, Utc::now())
            .await?
            .ok_or_else(|| {
                AppError::Unauthorized("The user belonging to this token no longer exists".into())
            })?;
        log::info!("User {} changed their password", user.id);

        self.open_session(user)
    }

    /// Issues a password reset link. Also serves the resend route.
    pub async fn forgot_password(&self, request: EmailRequest) -> Result<LinkSent, AppError> {
        let user = self.find_for_link(request).await?;

        let plain = self.rotate_token(&user, TokenPurpose::PasswordReset).await?;
        let url = self.link("reset-password", &plain);
        log::info!("Password reset requested for user {}", user.id);
        mail::dispatch(
            self.mailer.clone(),
            Email::new(&user.email, &user.name, EmailKind::PasswordReset { url: url.clone() }),
        );

        Ok(LinkSent {
            message: "Password reset link sent to your email".into(),
            url,
        })
    }

    pub async fn reset_password(
        &self,
        token: &str,
        request: ResetPasswordRequest,
    ) -> Result<Session, AppError> {
        request.validate()?;

        let password_hash = self.hash_password(request.new_password).await?;
        let user = self
            .store
            .redeem_reset(&digest(token), Utc::now(), &password_hash)
            .await?
            .ok_or_else(|| AppError::InvalidToken("Token is invalid or has expired".into()))?;
        log::info!("User {} reset their password", user.id);

        self.open_session(user)
    }

    /// Admin account creation: verified immediately, no email sent.
    pub async fn create_account(&self, mut request: AdminCreateUser) -> Result<User, AppError> {
        request.email = normalize_email(&request.email);
        request.validate()?;

        let password_hash = self.hash_password(request.password).await?;
        let user = self
            .store
            .create(NewUser {
                name: request.name.trim().to_string(),
                email: request.email,
                gender: request.gender,
                country: request.country.trim().to_string(),
                image: request.image,
                role: request.role,
                verified: true,
                password_hash,
                verification: None,
            })
            .await?;
        log::info!("Account {} created with role {}", user.id, user.role.as_str());

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::LogMailer;
    use crate::models::Gender;
    use crate::store::MemoryStore;

    fn service_with(store: Arc<MemoryStore>, resend_window: Duration) -> AuthService {
        AuthService::new(
            store,
            Arc::new(LogMailer),
            PasswordHasher::new(4),
            JwtKeys::new("service-test-secret", Duration::days(30)),
            TokenSettings {
                one_time_ttl: Duration::minutes(10),
                resend_window,
                app_url: "http://localhost:8080".into(),
            },
        )
    }

    fn service() -> (AuthService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (service_with(store.clone(), Duration::seconds(210)), store)
    }

    fn signup_request(email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            name: "Ada Lovelace".into(),
            email: email.into(),
            password: password.into(),
            confirm_password: password.into(),
            gender: Gender::Female,
            country: "United Kingdom".into(),
            image: None,
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    fn token_of(link: &LinkSent) -> String {
        link.url.rsplit('/').next().unwrap().to_string()
    }

    async fn verified_user(auth: &AuthService, email: &str, password: &str) -> Session {
        let link = auth.signup(signup_request(email, password)).await.unwrap();
        auth.verify_account(&token_of(&link)).await.unwrap()
    }

    #[actix_rt::test]
    async fn test_signup_creates_unverified_user() {
        let (auth, store) = service();
        let link = auth
            .signup(signup_request("  A@X.com ", "password1"))
            .await
            .unwrap();

        assert!(link.url.starts_with("http://localhost:8080/users/verify-user/"));
        let user = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert!(!user.verified);
        assert_eq!(user.role, Role::User);
        assert_ne!(user.password_hash, "password1");
        // Only the digest is stored
        assert_eq!(user.verification_token, Some(digest(&token_of(&link))));
        assert!(user.verification_expires_at.unwrap() > Utc::now());
    }

    #[actix_rt::test]
    async fn test_signup_rejects_duplicates_and_invalid_input() {
        let (auth, _) = service();
        auth.signup(signup_request("a@x.com", "password1"))
            .await
            .unwrap();

        let duplicate = auth.signup(signup_request("A@x.com", "password1")).await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));

        let short = auth.signup(signup_request("b@x.com", "pass")).await;
        assert!(matches!(short, Err(AppError::ValidationError(_))));

        let mut mismatch = signup_request("c@x.com", "password1");
        mismatch.confirm_password = "password2".into();
        assert!(matches!(
            auth.signup(mismatch).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[actix_rt::test]
    async fn test_login_requires_verification_and_exact_password() {
        let (auth, _) = service();
        let link = auth
            .signup(signup_request("a@x.com", "password1"))
            .await
            .unwrap();

        match auth.login(login_request("a@x.com", "password1")).await {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, BAD_CREDENTIALS),
            other => panic!("unverified login should fail, got {:?}", other.map(|s| s.user.id)),
        }

        auth.verify_account(&token_of(&link)).await.unwrap();
        let session = auth.login(login_request("A@X.com", "password1")).await.unwrap();
        assert_eq!(auth.authorize(&session.token).await.unwrap().user.email, "a@x.com");

        for wrong in ["password2", "Password1", "password", "password1 "] {
            match auth.login(login_request("a@x.com", wrong)).await {
                Err(AppError::Unauthorized(msg)) => assert_eq!(msg, BAD_CREDENTIALS),
                _ => panic!("login with {:?} should fail", wrong),
            }
        }
        match auth.login(login_request("nobody@x.com", "password1")).await {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, BAD_CREDENTIALS),
            _ => panic!("unknown email should fail"),
        }
        let missing = LoginRequest {
            email: Some("a@x.com".into()),
            password: None,
        };
        assert!(matches!(
            auth.login(missing).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[actix_rt::test]
    async fn test_verification_token_redeems_once() {
        let (auth, _) = service();
        let link = auth
            .signup(signup_request("a@x.com", "password1"))
            .await
            .unwrap();
        let token = token_of(&link);

        let session = auth.verify_account(&token).await.unwrap();
        assert!(session.user.verified);
        assert!(matches!(
            auth.verify_account(&token).await,
            Err(AppError::InvalidToken(_))
        ));
    }

    #[actix_rt::test]
    async fn test_resend_verification_cool_down() {
        let (auth, store) = service();
        let link = auth
            .signup(signup_request("a@x.com", "password1"))
            .await
            .unwrap();

        match auth
            .resend_verification(EmailRequest {
                email: "a@x.com".into(),
            })
            .await
        {
            Err(AppError::TooManyRequests(msg)) => {
                assert!(msg.starts_with("Please wait "), "{}", msg);
                assert!(msg.ends_with(" seconds before resending the link again."));
            }
            _ => panic!("resend inside the cool-down should be rate limited"),
        }

        // A window as long as the token lifetime means the pending token is always replaceable
        let eager = service_with(store, Duration::minutes(10));
        let resent = eager
            .resend_verification(EmailRequest {
                email: "a@x.com".into(),
            })
            .await
            .unwrap();
        assert_ne!(token_of(&resent), token_of(&link));

        assert!(matches!(
            eager.verify_account(&token_of(&link)).await,
            Err(AppError::InvalidToken(_))
        ));
        eager.verify_account(&token_of(&resent)).await.unwrap();

        assert!(matches!(
            eager
                .resend_verification(EmailRequest {
                    email: "a@x.com".into()
                })
                .await,
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            eager
                .resend_verification(EmailRequest {
                    email: "nobody@x.com".into()
                })
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[actix_rt::test]
    async fn test_password_change_invalidates_older_sessions() {
        let (auth, _) = service();
        let session = verified_user(&auth, "a@x.com", "password1").await;
        let user_id = session.user.id;
        let old_token = auth
            .keys()
            .issue_at(user_id, Utc::now() - Duration::seconds(10))
            .unwrap();
        let actor = auth.authorize(&old_token).await.unwrap();

        let wrong = auth
            .change_password(
                &actor,
                ChangePasswordRequest {
                    current_password: "password9".into(),
                    new_password: "password2".into(),
                    confirm_new_password: "password2".into(),
                },
            )
            .await;
        assert!(matches!(wrong, Err(AppError::Unauthorized(_))));

        let fresh = auth
            .change_password(
                &actor,
                ChangePasswordRequest {
                    current_password: "password1".into(),
                    new_password: "password2".into(),
                    confirm_new_password: "password2".into(),
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            auth.authorize(&old_token).await,
            Err(AppError::Unauthorized(_))
        ));
        assert_eq!(auth.authorize(&fresh.token).await.unwrap().id, user_id);
        assert!(auth.login(login_request("a@x.com", "password1")).await.is_err());
        assert!(auth.login(login_request("a@x.com", "password2")).await.is_ok());
    }

    #[actix_rt::test]
    async fn test_reset_password_flow() {
        let (auth, _) = service();
        let session = verified_user(&auth, "a@x.com", "password1").await;
        let old_token = auth
            .keys()
            .issue_at(session.user.id, Utc::now() - Duration::seconds(10))
            .unwrap();

        let link = auth
            .forgot_password(EmailRequest {
                email: "a@x.com".into(),
            })
            .await
            .unwrap();
        assert!(link.url.contains("/users/reset-password/"));
        assert!(matches!(
            auth.forgot_password(EmailRequest {
                email: "a@x.com".into()
            })
            .await,
            Err(AppError::TooManyRequests(_))
        ));

        let reset = ResetPasswordRequest {
            new_password: "password3".into(),
            confirm_new_password: "password3".into(),
        };
        let fresh = auth
            .reset_password(&token_of(&link), reset)
            .await
            .unwrap();
        assert!(auth.authorize(&fresh.token).await.is_ok());
        assert!(auth.authorize(&old_token).await.is_err());

        let again = ResetPasswordRequest {
            new_password: "password4".into(),
            confirm_new_password: "password4".into(),
        };
        assert!(matches!(
            auth.reset_password(&token_of(&link), again).await,
            Err(AppError::InvalidToken(_))
        ));
        assert!(auth.login(login_request("a@x.com", "password3")).await.is_ok());
    }

    #[actix_rt::test]
    async fn test_authorize_rejects_deleted_user_and_garbage() {
        let (auth, store) = service();
        let session = verified_user(&auth, "a@x.com", "password1").await;

        assert!(matches!(
            auth.authorize("garbage").await,
            Err(AppError::Unauthorized(_))
        ));

        crate::store::Repository::<User>::find_and_delete(store.as_ref(), session.user.id, None)
            .await
            .unwrap();
        match auth.authorize(&session.token).await {
            Err(AppError::Unauthorized(msg)) => assert!(msg.contains("no longer exists")),
            _ => panic!("token of a deleted user must be rejected"),
        }
    }

    #[actix_rt::test]
    async fn test_admin_created_account_is_verified() {
        let (auth, _) = service();
        let user = auth
            .create_account(AdminCreateUser {
                name: "Grace Hopper".into(),
                email: "Grace@X.com".into(),
                password: "password1".into(),
                gender: Gender::Female,
                country: "US".into(),
                image: None,
                role: Role::Admin,
            })
            .await
            .unwrap();

        assert!(user.verified);
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.email, "grace@x.com");
        assert!(auth.login(login_request("grace@x.com", "password1")).await.is_ok());
    }
}
