//! Miniature one-shot examples for strict re-prompts.
//!
//! When a role's first output fails to parse or validate, the re-prompt
//! includes a minimal valid example of the expected shape. The built-in
//! examples are versioned with the crate; a `shots/<role>.json` file in
//! the protocol dir overrides them.

use std::path::Path;

use crate::artifact::Role;

pub const SHOT_VERSION: &str = "v2";

const STRATEGIST_SHOT: &str = r#"[{"s_id":"S-1","title":"Example strategy","audience":"local homeowners","hooks":["seasonal urgency"],"three_step_plan":["prepare","execute","follow up"],"acceptance_tests":["3 bookings in week one"]}]"#;

const ANALYST_SHOT: &str = r#"[{"a_id":"A-1","s_refs":["S-1"],"kpi_table":[{"metric":"bookings","target":3,"unit":"jobs"}],"falsifications":["zero calls after 100 contacts"],"risks":["weather delays"]}]"#;

const PRODUCER_SHOT: &str = r#"[{"p_id":"P-1","a_refs":["A-1"],"spec_type":"copy_block","body":"Short, concrete asset text."}]"#;

const COURIER_SHOT: &str = r#"[{"day":"D1","time":"09:00","channel":"email","p_id":"P-1","kpi_target":"10 opens","owner_action":"send batch one"}]"#;

const CRITIC_SHOT: &str = r#"[{"x_id":"X-1","refs":["S-1","A-1","P-1"],"issue":"target not measurable daily","fix":"add a per-day counter","severity":"med","proof_scores":{"logic":0.8,"evidence":0.7,"feasibility":0.9,"clarity":0.8,"impact":0.6}}]"#;

pub fn one_shot(protocol_dir: &Path, role: Role) -> String {
    let override_path = protocol_dir.join("shots").join(format!("{}.json", role.name()));
    if let Ok(content) = std::fs::read_to_string(override_path) {
        return content.trim().to_string();
    }
    match role {
        Role::Strategist => STRATEGIST_SHOT,
        Role::Analyst => ANALYST_SHOT,
        Role::Producer => PRODUCER_SHOT,
        Role::Courier => COURIER_SHOT,
        Role::Critic => CRITIC_SHOT,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Analysis, CourierRow, Critique, Production, Strategy};

    #[test]
    fn builtin_shots_parse_as_their_role_types() {
        let dir = tempfile::tempdir().unwrap();
        serde_json::from_str::<Vec<Strategy>>(&one_shot(dir.path(), Role::Strategist)).unwrap();
        serde_json::from_str::<Vec<Analysis>>(&one_shot(dir.path(), Role::Analyst)).unwrap();
        serde_json::from_str::<Vec<Production>>(&one_shot(dir.path(), Role::Producer)).unwrap();
        serde_json::from_str::<Vec<CourierRow>>(&one_shot(dir.path(), Role::Courier)).unwrap();
        serde_json::from_str::<Vec<Critique>>(&one_shot(dir.path(), Role::Critic)).unwrap();
    }

    #[test]
    fn protocol_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("shots")).unwrap();
        std::fs::write(dir.path().join("shots/courier.json"), "[]").unwrap();
        assert_eq!(one_shot(dir.path(), Role::Courier), "[]");
    }
}
