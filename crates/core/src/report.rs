//! Final report composition.
//!
//! Stitches the session's registry into a single operator-facing
//! markdown document. The composer ledger entry commits to this text.

use axon_config::Domain;

use crate::artifact::Registry;

pub fn compose_report(objective: &str, domain: Domain, registry: &Registry) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Chain Report\n\nObjective: {objective}\nDomain: {domain}\n\n"));

    out.push_str("## Strategies\n");
    for s in &registry.strategies {
        out.push_str(&format!(
            "- **{}** {} (audience: {}; {} acceptance tests)\n",
            s.s_id,
            s.title,
            s.audience,
            s.acceptance_tests.len()
        ));
    }

    out.push_str("\n## Analyses\n");
    for a in &registry.analyses {
        let kpis = a
            .kpi_table
            .iter()
            .map(|k| format!("{} {} {}", k.metric, k.target, k.unit))
            .collect::<Vec<_>>()
            .join("; ");
        out.push_str(&format!(
            "- **{}** on {} — KPIs: {}\n",
            a.a_id,
            a.s_refs.join(", "),
            kpis
        ));
    }

    out.push_str("\n## Assets\n");
    for p in &registry.productions {
        out.push_str(&format!(
            "- **{}** ({:?}) from {}\n",
            p.p_id,
            p.spec_type,
            p.a_refs.join(", ")
        ));
    }

    out.push_str("\n## Schedule\n");
    for row in &registry.courier {
        out.push_str(&format!(
            "- {} {} via {}: {} (target {}, owner: {})\n",
            row.day, row.time, row.channel, row.p_id, row.kpi_target, row.owner_action
        ));
    }

    out.push_str("\n## Critique\n");
    for x in &registry.critiques {
        out.push_str(&format!(
            "- **{}** [{:?}] {} → {} (refs: {})\n",
            x.x_id,
            x.severity,
            x.issue,
            x.fix,
            x.refs.join(", ")
        ));
    }

    out
}
