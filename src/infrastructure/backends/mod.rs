#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

pub mod http;
pub mod memory;

use std::path;
use std::sync::Arc;

use anyhow::Result;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BackendName;
use crate::domain::models::SharedBackend;

pub struct BackendManager {}

impl BackendManager {
    pub async fn get(name: BackendName) -> Result<SharedBackend> {
        match name {
            BackendName::Memory => {
                let fixture_file = Config::get(ConfigKey::FixtureFile);
                if fixture_file.is_empty() {
                    return Ok(Arc::new(memory::MemoryBackend::default()));
                }

                let backend = memory::MemoryBackend::from_fixture(
                    &Config::get(ConfigKey::ConversationID),
                    &path::PathBuf::from(fixture_file),
                )
                .await?;

                return Ok(Arc::new(backend));
            }
            BackendName::Http => {
                return Ok(Arc::new(http::Http::default()));
            }
        }
    }
}
