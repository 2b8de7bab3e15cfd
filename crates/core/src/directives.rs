//! Role system-prompt composition.
//!
//! A role's system prompt is the directive texts followed by the
//! domain's role prompt file (`<domain>/<role>_stable.txt`). Domains
//! without a file for a role fall back to the default domain; a missing
//! default-domain file is fatal at session start, before any LLM call.

use std::path::PathBuf;

use anyhow::{bail, Result};

use axon_config::Domain;

use crate::artifact::Role;

const DIRECTIVE_FILES: &[&str] = &[
    "directives/axioms.md",
    "directives/conduct.md",
    "directives/escalation.md",
];

pub struct PromptComposer {
    protocol_dir: PathBuf,
    default_domain: Domain,
    directive_text: String,
}

impl PromptComposer {
    pub fn load(protocol_dir: PathBuf, default_domain: Domain) -> Self {
        let mut directive_text = String::new();
        for rel in DIRECTIVE_FILES {
            if let Ok(content) = std::fs::read_to_string(protocol_dir.join(rel)) {
                directive_text.push_str(content.trim_end());
                directive_text.push_str("\n\n");
            }
        }
        Self {
            protocol_dir,
            default_domain,
            directive_text,
        }
    }

    fn role_file(&self, domain: Domain, role: Role) -> Option<String> {
        let path = self
            .protocol_dir
            .join(domain.as_str())
            .join(format!("{}_stable.txt", role.name()));
        std::fs::read_to_string(path).ok()
    }

    /// Verify every role resolves to a prompt file before the session
    /// touches the LLM.
    pub fn ensure_role_prompts(&self, domain: Domain) -> Result<()> {
        for role in Role::all() {
            if self.role_file(domain, *role).is_none()
                && self.role_file(self.default_domain, *role).is_none()
            {
                bail!(
                    "no prompt file for role '{}' in domain '{}' or default '{}'",
                    role.name(),
                    domain,
                    self.default_domain
                );
            }
        }
        Ok(())
    }

    pub fn system_prompt(&self, domain: Domain, role: Role) -> Result<String> {
        let role_text = match self.role_file(domain, role) {
            Some(text) => text,
            None => match self.role_file(self.default_domain, role) {
                Some(text) => {
                    tracing::debug!(
                        role = role.name(),
                        domain = %domain,
                        "role prompt missing, using default domain"
                    );
                    text
                }
                None => bail!(
                    "no prompt file for role '{}' in domain '{}' or default '{}'",
                    role.name(),
                    domain,
                    self.default_domain
                ),
            },
        };
        Ok(format!("{}{}", self.directive_text, role_text.trim()))
    }
}
