//! Starter protocol tree for `axon init`.
//!
//! A session cannot start without role prompt files for at least the
//! default domain, so `init` writes a working set the operator can then
//! edit in place. Existing files are never overwritten.

use std::path::Path;

use anyhow::{Context, Result};

use crate::{builtin_domain_weights, CouplingConfig, Domain, RoleShapes};

const ROLES: &[&str] = &["strategist", "analyst", "producer", "courier", "critic"];

const AXIOMS_MD: &str = "\
# Axioms

1. Every claim is falsifiable or it is not a claim.
2. Downstream work may only build on artifacts that exist upstream.
3. The ledger is the memory; unrecorded work did not happen.
";

const CONDUCT_MD: &str = "\
# Conduct

- State disagreement plainly; flattery is a defect, not a courtesy.
- Prefer one measured number over three adjectives.
- Never restate upstream prose; reference it by id.
";

const ESCALATION_MD: &str = "\
# Escalation

When a hard gate fires, the clamped scores stand. Operators review the
audit tags on the ledger entry; the chain itself never renegotiates a
directive.
";

fn role_prompt(role: &str) -> String {
    let (letter, duty) = match role {
        "strategist" => ("S", "propose strategies: title, audience, hooks, a three step plan, and acceptance tests"),
        "analyst" => ("A", "analyze the strategies you are given: KPI table with numeric targets and units, falsifications, risks"),
        "producer" => ("P", "produce concrete assets for the analyses you are given: api, ddl, config, copy_block, wiring, or prompt_pack bodies"),
        "courier" => ("C", "schedule the declared producer assets across days D1..D7 with channel, kpi_target, and owner_action"),
        _ => ("X", "critique the whole registry: issue, fix, severity, and proof scores, referencing ids across kinds"),
    };
    format!(
        "You are the {role}. Your job: {duty}.\n\
         Respond with exactly one fenced code block tagged `{letter}` containing a JSON array of objects.\n\
         No prose inside the fence. Reference upstream artifacts only by their ids.\n"
    )
}

/// Write the starter protocol files under `protocol_dir` for
/// `default_domain`. Returns the list of files created.
pub fn write_starter_protocol(protocol_dir: &Path, default_domain: Domain) -> Result<Vec<String>> {
    let mut created = Vec::new();
    std::fs::create_dir_all(protocol_dir.join("directives"))
        .context("Failed to create directives dir")?;
    std::fs::create_dir_all(protocol_dir.join(default_domain.as_str()))
        .context("Failed to create domain dir")?;

    let mut write = |rel: String, content: String| -> Result<()> {
        let path = protocol_dir.join(&rel);
        if path.exists() {
            return Ok(());
        }
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        created.push(rel);
        Ok(())
    };

    write(
        "coupling.json".to_string(),
        serde_json::to_string_pretty(&CouplingConfig::builtin())?,
    )?;
    let weights: std::collections::BTreeMap<String, crate::AxisWeights> = builtin_domain_weights()
        .into_iter()
        .map(|(d, w)| (d.as_str().to_string(), w))
        .collect();
    write(
        "domain_weights.json".to_string(),
        serde_json::to_string_pretty(&weights)?,
    )?;
    write(
        "role_shapes.json".to_string(),
        serde_json::to_string_pretty(&RoleShapes::builtin())?,
    )?;
    write("directives/axioms.md".to_string(), AXIOMS_MD.to_string())?;
    write("directives/conduct.md".to_string(), CONDUCT_MD.to_string())?;
    write(
        "directives/escalation.md".to_string(),
        ESCALATION_MD.to_string(),
    )?;
    for role in ROLES {
        write(
            format!("{}/{}_stable.txt", default_domain.as_str(), role),
            role_prompt(role),
        )?;
    }

    Ok(created)
}
