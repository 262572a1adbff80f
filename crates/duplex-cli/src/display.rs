//! Terminal rendering of reconciliation results

use console::style;
use duplex_sync::{ReconciliationReport, SyncSnapshot, SyncState};
use duplex_tree::{PropagationNodeModel, PropagationTree, TreeNodeModel};
use std::fmt::Write;

/// Print the conflicts and the Propagation Tree
pub fn print_reconciliation(report: &ReconciliationReport, result: &SyncSnapshot) -> anyhow::Result<()> {
    let state = SyncState::from_snapshot(result.clone())?;

    println!("{}", style("Conflicts").bold().underlined());
    if report.conflicts.is_empty() {
        println!("  {}", style("none").dim());
    }
    for conflict in &report.conflicts {
        let label = format!("{}", conflict.conflict_type);
        let label = if conflict.conflict_type.is_pseudo() {
            style(label).dim()
        } else {
            style(label).yellow().bold()
        };
        println!("  {} on node {}", label, conflict.node_id);
    }

    println!();
    println!(
        "{} ({} node(s))",
        style("Propagation Tree").bold().underlined(),
        report.propagation_nodes
    );
    print!("{}", render_tree(&state.propagation));
    Ok(())
}

/// One line per node, indented by depth, parents first
pub fn render_tree(tree: &PropagationTree) -> String {
    let mut output = String::new();
    for id in tree.pre_order(tree.root_id()).into_iter().skip(1) {
        let Some(model) = tree.get(id) else {
            continue;
        };
        let depth = tree.ancestors(id).count();
        let _ = writeln!(output, "{}{}", "  ".repeat(depth), describe(model));
    }
    output
}

fn describe(model: &PropagationNodeModel) -> String {
    let mut line = model.name().to_string();
    if model.is_directory() {
        line.push('/');
    }
    let _ = write!(
        line,
        "  remote: {}, local: {}  (id {}, alt {})",
        model.remote_status,
        model.local_status,
        model.id(),
        model.alt_id
    );
    if let Some(backup) = &model.backup_name {
        let _ = write!(line, "  backup: \"{}\"", backup);
    }
    line
}
