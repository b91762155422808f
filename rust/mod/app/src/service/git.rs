use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tracing::info;

use lowcode_core::{Principal, now_rfc3339};

use super::{AppError, AppService, require};
use crate::model::{GitApplicationMetadata, GitAuth, Permission};

const KEY_TYPE: &str = "ssh-ed25519";

/// Append an RFC 4251 `string`: u32 big-endian length, then the bytes.
fn put_string(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Fresh Ed25519 deploy key. The public half is an OpenSSH
/// `authorized_keys` line, the private half the hex-encoded seed.
pub(crate) fn generate_key_pair(comment: &str) -> GitAuth {
    let signing_key = SigningKey::generate(&mut OsRng);

    let mut blob = Vec::with_capacity(4 + KEY_TYPE.len() + 4 + 32);
    put_string(&mut blob, KEY_TYPE.as_bytes());
    put_string(&mut blob, signing_key.verifying_key().as_bytes());

    GitAuth {
        public_key: format!("{KEY_TYPE} {} {comment}", STANDARD.encode(&blob)),
        private_key: hex::encode(signing_key.to_bytes()),
        generated_at: now_rfc3339(),
    }
}

impl AppService {
    /// Generate a deploy key pair and attach it to the application's git
    /// root.
    ///
    /// The root is the application named by `default_application_id`, or
    /// the application itself when that is unset (it then becomes its own
    /// root). A child never keeps a key of its own.
    pub async fn create_or_update_ssh_key_pair(
        &self,
        application_id: &str,
        principal: &Principal,
    ) -> Result<(), AppError> {
        require("application_id", application_id)?;
        let mut app = self
            .applications
            .find_by_id(application_id, Permission::ManageApplications, principal)
            .await?;
        let git_auth = generate_key_pair(&self.config.ssh_key_comment);

        let root_id = match app.root_application_id() {
            Some(root_id) if root_id != app.id => root_id.to_string(),
            _ => {
                let metadata = app
                    .git_application_metadata
                    .get_or_insert_with(GitApplicationMetadata::default);
                metadata.default_application_id = Some(app.id.clone());
                metadata.git_auth = Some(git_auth);
                let app = self.applications.save(app).await?;
                info!("generated deploy key for application {}", app.id);
                return Ok(());
            }
        };

        let mut root = self
            .applications
            .find_by_id(&root_id, Permission::ManageApplications, principal)
            .await?;
        root.git_application_metadata
            .get_or_insert_with(GitApplicationMetadata::default)
            .git_auth = Some(git_auth);
        self.applications.save(root).await?;

        let stale = app
            .git_application_metadata
            .as_mut()
            .and_then(|m| m.git_auth.take());
        if stale.is_some() {
            self.applications.save(app).await?;
        }
        info!("generated deploy key for application {application_id} on root {root_id}");
        Ok(())
    }
}
