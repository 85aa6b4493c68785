use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use clap::Subcommand;
use specledger_core::config::Config;
use specledger_core::context::{resolve_spec_context, ContextDetector};
use specledger_core::duplicate::{check_duplicates, format_duplicate_warning};
use specledger_core::graph::{self, LinkType};
use specledger_core::issue::{DefinitionOfDone, Issue, IssueStatus, IssueType, DEFAULT_PRIORITY};
use specledger_core::migrate::{MigrateOptions, Migrator};
use specledger_core::store::{find_across_specs, list_all_specs, IssueStore, IssueUpdate, ListFilter};
use specledger_core::tree::{format_cycle_warning, truncate, TreeOptions, TreeRenderer};
use specledger_core::{id, paths, SpecLedgerError};
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

const TABLE_TITLE_WIDTH: usize = 40;

#[derive(Subcommand)]
pub enum IssueSubcommand {
    /// Create an issue in the current spec
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// epic, feature, task or bug
        #[arg(long = "type", default_value = "task")]
        kind: String,
        /// 0 (highest) to 5
        #[arg(long, short = 'p', default_value_t = DEFAULT_PRIORITY)]
        priority: i32,
        /// Comma-separated labels
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
        /// Override the spec context detected from the branch
        #[arg(long)]
        spec: Option<String>,
        /// Skip duplicate detection
        #[arg(long)]
        force: bool,
        /// Definition-of-done item (repeatable)
        #[arg(long = "dod")]
        dod: Vec<String>,
    },
    /// List issues
    List {
        /// open, in_progress or closed
        #[arg(long)]
        status: Option<String>,
        #[arg(long = "type")]
        kind: Option<String>,
        #[arg(long, short = 'p')]
        priority: Option<i32>,
        /// Required label (repeatable)
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long)]
        spec: Option<String>,
        /// List across all specs
        #[arg(long)]
        all: bool,
        /// Only issues with open blockers
        #[arg(long)]
        blocked: bool,
        /// Show the dependency tree
        #[arg(long)]
        tree: bool,
    },
    /// Show one issue
    Show {
        id: String,
        #[arg(long)]
        spec: Option<String>,
        /// Show what blocks it and what it blocks
        #[arg(long)]
        tree: bool,
    },
    /// Update issue fields
    Update {
        id: String,
        #[arg(long)]
        spec: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, short = 'p')]
        priority: Option<i32>,
        #[arg(long = "type")]
        kind: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        design: Option<String>,
        #[arg(long = "acceptance-criteria")]
        acceptance_criteria: Option<String>,
        /// Parent issue ID; an empty value clears it
        #[arg(long)]
        parent: Option<String>,
        #[arg(long = "add-label")]
        add_labels: Vec<String>,
        #[arg(long = "remove-label")]
        remove_labels: Vec<String>,
        /// Replace the definition of done (repeatable)
        #[arg(long = "dod")]
        dod: Vec<String>,
        /// Check a definition-of-done item (repeatable)
        #[arg(long)]
        check: Vec<String>,
        /// Uncheck a definition-of-done item (repeatable)
        #[arg(long)]
        uncheck: Vec<String>,
    },
    /// Close an issue
    Close {
        id: String,
        #[arg(long)]
        spec: Option<String>,
        /// Recorded in the issue notes
        #[arg(long)]
        reason: Option<String>,
    },
    /// Delete an issue and every reference to it
    Delete {
        id: String,
        #[arg(long)]
        spec: Option<String>,
    },
    /// Link two issues: `<from> blocks <to>` or `<from> related <to>`
    Link {
        from: String,
        link: String,
        to: String,
        #[arg(long)]
        spec: Option<String>,
    },
    /// Remove a link between two issues
    Unlink {
        from: String,
        link: String,
        to: String,
        #[arg(long)]
        spec: Option<String>,
    },
    /// List open issues with no open blockers
    Ready {
        #[arg(long)]
        spec: Option<String>,
        /// Across all specs
        #[arg(long)]
        all: bool,
    },
    /// Drop unreadable lines from the issue file (original kept as .bak)
    Repair {
        #[arg(long)]
        spec: Option<String>,
    },
    /// Import issues from .beads/issues.jsonl
    Migrate {
        #[arg(long)]
        dry_run: bool,
        /// Leave .beads/ in place
        #[arg(long)]
        keep_beads: bool,
    },
    /// Report dependency cycles
    Cycles {
        #[arg(long)]
        spec: Option<String>,
        #[arg(long)]
        all: bool,
    },
}

// ---------------------------------------------------------------------------
// Shared context
// ---------------------------------------------------------------------------

struct Ctx {
    root: PathBuf,
    base: PathBuf,
    cfg: Config,
}

impl Ctx {
    fn load(root: &Path) -> anyhow::Result<Self> {
        let cfg = Config::load().context("failed to load user config")?;
        Ok(Self {
            root: root.to_path_buf(),
            base: root.join(&cfg.artifact_path),
            cfg,
        })
    }

    fn spec(&self, explicit: Option<&str>) -> anyhow::Result<String> {
        let detector = ContextDetector::new(&self.root);
        Ok(resolve_spec_context(explicit, &detector)?)
    }

    fn store(&self, explicit: Option<&str>) -> anyhow::Result<IssueStore> {
        let spec = self.spec(explicit)?;
        Ok(IssueStore::open(&self.base, &spec)?)
    }

    /// Store holding `issue_id`: the explicit spec when given, otherwise
    /// whichever spec directory contains it.
    fn store_for(&self, explicit: Option<&str>, issue_id: &str) -> anyhow::Result<IssueStore> {
        id::parse(issue_id)?;
        if explicit.is_some() {
            return self.store(explicit);
        }
        let (_, spec) = find_across_specs(&self.base, issue_id)?;
        Ok(IssueStore::open(&self.base, &spec)?)
    }
}

fn renderer(show_spec: bool) -> TreeRenderer {
    TreeRenderer::new(TreeOptions {
        show_spec,
        color: std::io::stdout().is_terminal(),
        ..Default::default()
    })
}

pub fn run(root: &Path, subcmd: IssueSubcommand, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::load(root)?;
    match subcmd {
        IssueSubcommand::Create {
            title,
            description,
            kind,
            priority,
            labels,
            spec,
            force,
            dod,
        } => {
            let draft = Draft {
                title,
                description,
                kind,
                priority,
                labels,
                dod,
            };
            create(&ctx, draft, spec.as_deref(), force, json)
        }
        IssueSubcommand::List {
            status,
            kind,
            priority,
            labels,
            spec,
            all,
            blocked,
            tree,
        } => {
            let filter = build_filter(status.as_deref(), kind.as_deref(), priority, labels, blocked, all)?;
            list(&ctx, spec.as_deref(), &filter, tree, json)
        }
        IssueSubcommand::Show { id, spec, tree } => show(&ctx, &id, spec.as_deref(), tree, json),
        IssueSubcommand::Update {
            id,
            spec,
            title,
            description,
            status,
            priority,
            kind,
            assignee,
            notes,
            design,
            acceptance_criteria,
            parent,
            add_labels,
            remove_labels,
            dod,
            check,
            uncheck,
        } => {
            let update = IssueUpdate {
                title,
                description,
                status: status.as_deref().map(str::parse).transpose()?,
                priority,
                issue_type: kind.as_deref().map(str::parse).transpose()?,
                assignee,
                notes,
                design,
                acceptance_criteria,
                parent_id: parent.map(|p| Some(p).filter(|p| !p.is_empty())),
                labels: None,
                add_labels,
                remove_labels,
                definition_of_done: (!dod.is_empty()).then(|| DefinitionOfDone::from_items(dod)),
                check_dod: check,
                uncheck_dod: uncheck,
            };
            update_issue(&ctx, &id, spec.as_deref(), update, json)
        }
        IssueSubcommand::Close { id, spec, reason } => {
            close(&ctx, &id, spec.as_deref(), reason.as_deref(), json)
        }
        IssueSubcommand::Delete { id, spec } => delete(&ctx, &id, spec.as_deref(), json),
        IssueSubcommand::Link {
            from,
            link,
            to,
            spec,
        } => link_issues(&ctx, &from, &link, &to, spec.as_deref(), true, json),
        IssueSubcommand::Unlink {
            from,
            link,
            to,
            spec,
        } => link_issues(&ctx, &from, &link, &to, spec.as_deref(), false, json),
        IssueSubcommand::Ready { spec, all } => ready(&ctx, spec.as_deref(), all, json),
        IssueSubcommand::Repair { spec } => repair(&ctx, spec.as_deref(), json),
        IssueSubcommand::Migrate {
            dry_run,
            keep_beads,
        } => migrate(&ctx, MigrateOptions { dry_run, keep_beads }, json),
        IssueSubcommand::Cycles { spec, all } => cycles(&ctx, spec.as_deref(), all, json),
    }
}

pub fn build_filter(
    status: Option<&str>,
    kind: Option<&str>,
    priority: Option<i32>,
    labels: Vec<String>,
    blocked: bool,
    all: bool,
) -> anyhow::Result<ListFilter> {
    Ok(ListFilter {
        status: status.map(str::parse::<IssueStatus>).transpose()?,
        issue_type: kind.map(str::parse::<IssueType>).transpose()?,
        priority,
        labels,
        blocked,
        all,
    })
}

// ---------------------------------------------------------------------------
// create / list / show
// ---------------------------------------------------------------------------

struct Draft {
    title: String,
    description: String,
    kind: String,
    priority: i32,
    labels: Vec<String>,
    dod: Vec<String>,
}

fn create(ctx: &Ctx, draft: Draft, spec: Option<&str>, force: bool, json: bool) -> anyhow::Result<()> {
    let store = ctx.store(spec)?;
    let kind: IssueType = draft.kind.parse()?;

    if !force {
        let dups = check_duplicates(&store, &draft.title, ctx.cfg.similarity_threshold)
            .context("failed to check for duplicates")?;
        if !dups.is_empty() {
            eprint!("{}", format_duplicate_warning(&dups));
            bail!("potential duplicate of {}", dups[0].issue.id);
        }
    }

    let mut issue = Issue::new(
        draft.title,
        draft.description,
        store.spec(),
        kind,
        draft.priority,
        chrono::Utc::now(),
    );
    for label in draft.labels.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        issue.add_label(label);
    }
    if !draft.dod.is_empty() {
        issue.definition_of_done = Some(DefinitionOfDone::from_items(draft.dod));
    }
    let issue = store.create(issue)?;

    if json {
        print_json(&issue)?;
    } else {
        println!("Created issue {}", issue.id);
        println!("  Title:    {}", issue.title);
        println!("  Type:     {}", issue.issue_type);
        println!("  Priority: {}", issue.priority);
        println!("  Spec:     {}", issue.spec_context);
        println!();
        println!("View: sl issue show {}", issue.id);
    }
    Ok(())
}

fn issue_rows(issues: &[Issue]) -> Vec<Vec<String>> {
    issues
        .iter()
        .map(|i| {
            vec![
                i.id.clone(),
                truncate(&i.title, TABLE_TITLE_WIDTH),
                i.status.to_string(),
                i.issue_type.to_string(),
                i.priority.to_string(),
                i.spec_context.clone(),
            ]
        })
        .collect()
}

fn list(ctx: &Ctx, spec: Option<&str>, filter: &ListFilter, tree: bool, json: bool) -> anyhow::Result<()> {
    let (issues, label) = if filter.all {
        (list_all_specs(&ctx.base, filter)?, "All Specs".to_string())
    } else {
        let store = ctx.store(spec)?;
        (store.list(filter)?, store.spec().to_string())
    };

    if json {
        return print_json(&issues);
    }
    if issues.is_empty() {
        println!("No issues found.");
        return Ok(());
    }
    if !tree {
        print_table(&["ID", "TITLE", "STATUS", "TYPE", "PRIORITY", "SPEC"], issue_rows(&issues));
        return Ok(());
    }

    let r = renderer(false);
    if !filter.all {
        let forest = graph::blocks_forest(&issues);
        print!("{}", format_cycle_warning(&graph::find_tree_cycles(&forest)));
        print!("{}", r.render_with_root(&label, &forest, issues.len()));
        return Ok(());
    }

    let mut by_spec: BTreeMap<&str, Vec<Issue>> = BTreeMap::new();
    for i in &issues {
        by_spec.entry(i.spec_context.as_str()).or_default().push(i.clone());
    }
    println!("{label}");
    for (spec, group) in &by_spec {
        let forest = graph::blocks_forest(group);
        print!("{}", format_cycle_warning(&graph::find_tree_cycles(&forest)));
        print!("{}", r.render_with_root(spec, &forest, group.len()));
    }
    Ok(())
}

fn print_issue(issue: &Issue) {
    println!("Issue: {}", issue.id);
    println!("  Title:    {}", issue.title);
    println!("  Type:     {}", issue.issue_type);
    println!("  Status:   {}", issue.status);
    let rank = match issue.priority {
        0 => " (critical)",
        1 => " (high)",
        _ => "",
    };
    println!("  Priority: {}{rank}", issue.priority);
    println!("  Spec:     {}", issue.spec_context);
    if let Some(parent) = &issue.parent_id {
        println!("  Parent:   {parent}");
    }
    if !issue.assignee.is_empty() {
        println!("  Assignee: {}", issue.assignee);
    }
    println!();

    let block = |heading: &str, body: &str| {
        if !body.is_empty() {
            println!("{heading}:");
            println!("  {}", body.replace('\n', "\n  "));
            println!();
        }
    };
    block("Description", &issue.description);
    block("Design", &issue.design);
    block("Acceptance Criteria", &issue.acceptance_criteria);
    block("Notes", &issue.notes);

    if !issue.labels.is_empty() {
        println!("Labels: {}", issue.labels.join(", "));
        println!();
    }
    if let Some(dod) = issue.definition_of_done.as_ref().filter(|d| !d.items.is_empty()) {
        println!("Definition of Done:");
        for item in &dod.items {
            let mark = if item.checked { "x" } else { " " };
            println!("  [{mark}] {}", item.item);
        }
        println!();
    }

    let fmt = "%Y-%m-%d %H:%M:%S";
    println!("Created: {}", issue.created_at.format(fmt));
    println!("Updated: {}", issue.updated_at.format(fmt));
    if let Some(closed) = issue.closed_at {
        println!("Closed:  {}", closed.format(fmt));
    }
}

fn show(ctx: &Ctx, issue_id: &str, spec: Option<&str>, tree: bool, json: bool) -> anyhow::Result<()> {
    let store = ctx.store_for(spec, issue_id)?;
    let issue = store.get(issue_id)?;
    let deps = if tree {
        Some(store.dependency_tree(issue_id)?)
    } else {
        None
    };

    if json {
        return match deps {
            Some(t) => print_json(&serde_json::json!({ "issue": issue, "tree": t })),
            None => print_json(&issue),
        };
    }

    print_issue(&issue);
    let Some(t) = deps else {
        return Ok(());
    };
    println!();
    let r = renderer(false);
    if t.blocked_by.is_empty() && t.blocks.is_empty() {
        println!("(No dependencies)");
        return Ok(());
    }
    if !t.blocked_by.is_empty() {
        println!("Blocked by:");
        for b in &t.blocked_by {
            println!("  {}", r.format_issue(&b.issue));
        }
        println!();
    }
    print!("{}", r.render(&t));
    Ok(())
}

// ---------------------------------------------------------------------------
// update / close / delete / link
// ---------------------------------------------------------------------------

fn update_issue(
    ctx: &Ctx,
    issue_id: &str,
    spec: Option<&str>,
    update: IssueUpdate,
    json: bool,
) -> anyhow::Result<()> {
    let store = ctx.store_for(spec, issue_id)?;
    let issue = store.update(issue_id, update)?;
    if json {
        print_json(&issue)?;
    } else {
        println!("Updated issue {}", issue.id);
    }
    Ok(())
}

/// Append `Closed: <reason>` to existing notes.
pub fn notes_with_reason(notes: &str, reason: &str) -> String {
    if notes.is_empty() {
        format!("Closed: {reason}")
    } else {
        format!("{notes}\n\nClosed: {reason}")
    }
}

fn close(ctx: &Ctx, issue_id: &str, spec: Option<&str>, reason: Option<&str>, json: bool) -> anyhow::Result<()> {
    let store = ctx.store_for(spec, issue_id)?;
    let current = store.get(issue_id)?;
    let update = IssueUpdate {
        status: Some(IssueStatus::Closed),
        notes: reason.map(|r| notes_with_reason(&current.notes, r)),
        ..Default::default()
    };
    let issue = match store.update(issue_id, update) {
        Err(SpecLedgerError::DoDIncomplete { unchecked, .. }) if !json => {
            println!("Definition of done not met:");
            for item in &unchecked {
                println!("  [ ] {item}");
            }
            return Err(SpecLedgerError::DoDIncomplete {
                id: issue_id.to_string(),
                unchecked,
            }
            .into());
        }
        other => other?,
    };

    if json {
        print_json(&issue)?;
    } else {
        println!("Closed issue {}", issue.id);
        if let Some(r) = reason {
            println!("  Reason: {r}");
        }
    }
    Ok(())
}

fn delete(ctx: &Ctx, issue_id: &str, spec: Option<&str>, json: bool) -> anyhow::Result<()> {
    let store = ctx.store_for(spec, issue_id)?;
    store.delete(issue_id)?;
    if json {
        print_json(&serde_json::json!({ "deleted": issue_id }))?;
    } else {
        println!("Deleted issue {issue_id}");
    }
    Ok(())
}

fn link_issues(
    ctx: &Ctx,
    from: &str,
    link: &str,
    to: &str,
    spec: Option<&str>,
    add: bool,
    json: bool,
) -> anyhow::Result<()> {
    id::parse(to)?;
    let link: LinkType = link.parse()?;
    let store = ctx.store_for(spec, from)?;
    if add {
        store
            .add_dependency(from, to, link)
            .context("cannot create dependency")?;
    } else {
        store
            .remove_dependency(from, to, link)
            .context("cannot remove dependency")?;
    }

    if json {
        print_json(&serde_json::json!({
            "from": from,
            "to": to,
            "link": link,
            "linked": add,
        }))?;
    } else if add {
        println!("Created dependency: {from} {link} {to}");
    } else {
        println!("Removed dependency: {from} {link} {to}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ready / repair / migrate / cycles
// ---------------------------------------------------------------------------

fn ready(ctx: &Ctx, spec: Option<&str>, all: bool, json: bool) -> anyhow::Result<()> {
    let filter = ListFilter {
        all,
        ..Default::default()
    };
    let (issues, store) = if all {
        (graph::list_ready_across_specs(&ctx.base, &filter)?, None)
    } else {
        let store = ctx.store(spec)?;
        (store.list_ready(&filter)?, Some(store))
    };

    if json {
        return print_json(&issues);
    }
    if !issues.is_empty() {
        let r = renderer(all);
        for i in &issues {
            println!("{}", r.format_issue(i));
        }
        return Ok(());
    }

    println!("No ready issues found.");
    let blocked = match &store {
        Some(s) => s.list_blocked()?,
        None => Vec::new(),
    };
    if !blocked.is_empty() {
        println!();
        println!("Blocked issues:");
        for b in &blocked {
            println!("  {} \"{}\" is blocked by:", b.issue.id, truncate(&b.issue.title, 40));
            for blocker in &b.blockers {
                println!(
                    "    - {} \"{}\" ({})",
                    blocker.id,
                    truncate(&blocker.title, 30),
                    blocker.status
                );
            }
            for missing in &b.missing {
                println!("    - {missing} (missing)");
            }
        }
    }
    Ok(())
}

fn repair(ctx: &Ctx, spec: Option<&str>, json: bool) -> anyhow::Result<()> {
    let store = ctx.store(spec)?;
    let report = store.repair()?;
    if json {
        return print_json(&report);
    }
    println!("Spec: {}", store.spec());
    println!("  Valid lines:      {}", report.valid_lines);
    println!("  Invalid lines:    {}", report.invalid_lines);
    println!("  Recovered issues: {}", report.recovered_issues);
    if !report.skipped_lines.is_empty() {
        println!();
        println!("Invalid lines skipped:");
        for s in &report.skipped_lines {
            println!("  line {}: {}", s.line_num, s.reason);
        }
    }
    if let Some(backup) = &report.backup_path {
        println!();
        println!("Backup: {}", backup.display());
    }
    Ok(())
}

fn migrate(ctx: &Ctx, opts: MigrateOptions, json: bool) -> anyhow::Result<()> {
    let report = match Migrator::new(&ctx.root, &ctx.base).migrate(opts) {
        Err(SpecLedgerError::BeadsNotFound(path)) => {
            if json {
                print_json(&serde_json::json!({ "total_issues": 0, "dry_run": opts.dry_run }))?;
            } else {
                println!("No {path} found - nothing to migrate");
            }
            return Ok(());
        }
        other => other?,
    };
    if json {
        return print_json(&report);
    }

    println!("Total issues found: {}", report.total_issues);
    println!();
    println!("Issues by spec:");
    for (spec, count) in &report.spec_distribution {
        println!("  {spec}: {count} issues");
    }
    if !report.unmapped_issues.is_empty() {
        println!();
        println!(
            "{} issues could not be mapped to a spec; they go to {}/{}/",
            report.unmapped_issues.len(),
            paths::SPECLEDGER_DIR,
            paths::MIGRATED_SPEC
        );
    }
    for (heading, lines) in [("errors", &report.errors), ("warnings", &report.warnings)] {
        if !lines.is_empty() {
            println!();
            println!("{} {heading} during migration", lines.len());
            for l in lines {
                println!("  - {l}");
            }
        }
    }

    println!();
    if report.dry_run {
        println!("Dry run complete. No changes were made.");
        println!("Run without --dry-run to perform the migration.");
    } else {
        println!("Migration complete: {} issues migrated", report.migrated_issues);
        println!();
        println!("Next steps:");
        println!("  sl issue list --all");
        println!("  sl issue show <issue-id>");
    }
    Ok(())
}

fn cycles(ctx: &Ctx, spec: Option<&str>, all: bool, json: bool) -> anyhow::Result<()> {
    let issues = if all {
        list_all_specs(&ctx.base, &ListFilter::default())?
    } else {
        ctx.store(spec)?.list(&ListFilter::default())?
    };
    let found = graph::detect_cycles(&issues);
    let (related, blocking): (Vec<_>, Vec<_>) = found
        .into_iter()
        .partition(|c| graph::cycle_is_related(&issues, c));

    if json {
        let entries: Vec<_> = blocking
            .iter()
            .map(|c| serde_json::json!({ "cycle": c, "related": false }))
            .chain(
                related
                    .iter()
                    .map(|c| serde_json::json!({ "cycle": c, "related": true })),
            )
            .collect();
        return print_json(&entries);
    }

    if blocking.is_empty() && related.is_empty() {
        println!("No cyclic dependencies found.");
        return Ok(());
    }
    print!("{}", format_cycle_warning(&blocking));
    if !related.is_empty() {
        println!("Related links (not scheduling cycles):");
        for c in &related {
            println!("  {}", c.join(" ↔ "));
        }
    }
    Ok(())
}
