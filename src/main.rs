use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::{Path, PathBuf};

use ownership_networks::{
    audit, setup_database, CancellationToken, ClusteringPolicy, EntityRef, EdgeUniverse,
    HubClassifier, PathQuery, RebuildRunner,
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        print_usage();
        bail!("missing arguments");
    }

    let command = args[1].as_str();
    let db_path = PathBuf::from(&args[2]);

    match command {
        "rebuild" => run_rebuild(&db_path, args.get(3).map(Path::new)),
        "incremental" => run_incremental(&db_path, &args[3..]),
        "path" => run_path(&db_path, &args[3..]),
        "audit" => run_audit(&db_path, &args[3..]),
        other => {
            print_usage();
            bail!("unknown command: {other}");
        }
    }
}

fn print_usage() {
    eprintln!("Usage: ownership-networks <command> <db-path> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  rebuild <db-path> [policy.json]          full network rebuild");
    eprintln!("  incremental <db-path> <type:id> [...]    attach newly-linked entities");
    eprintln!("  path <db-path> <type:id> <type:id>       shortest connection between two entities");
    eprintln!("  audit <db-path> <out-dir> [policy.json]  export hub report and network summaries");
}

fn load_policy(path: Option<&Path>) -> Result<ClusteringPolicy> {
    match path {
        Some(p) => Ok(ClusteringPolicy::from_json_file(p)?),
        None => Ok(ClusteringPolicy::default()),
    }
}

fn open_database(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn run_rebuild(db_path: &Path, policy_path: Option<&Path>) -> Result<()> {
    let policy = load_policy(policy_path)?;
    let mut conn = open_database(db_path)?;

    let runner = RebuildRunner::new(policy, CancellationToken::new());
    let report = runner.run_full(&mut conn)?;

    println!("Rebuild {} complete", report.run_id);
    println!("  networks:         {}", report.network_count);
    println!("  memberships:      {}", report.membership_count);
    println!("  suppressed edges: {}", report.suppressed_edge_count);
    println!(
        "  hubs:             {} node(s), {} value(s)",
        report.hub_node_count, report.hub_value_count
    );
    println!("  fingerprint:      {}", report.fingerprint);
    Ok(())
}

fn run_incremental(db_path: &Path, entity_args: &[String]) -> Result<()> {
    if entity_args.is_empty() {
        bail!("incremental mode needs at least one entity as type:id");
    }

    let mut entities = Vec::new();
    for arg in entity_args {
        let entity = EntityRef::parse(arg)
            .with_context(|| format!("invalid entity '{arg}', expected type:id"))?;
        entities.push(entity);
    }

    let mut conn = open_database(db_path)?;
    let runner = RebuildRunner::new(ClusteringPolicy::default(), CancellationToken::new());
    let report = runner.run_incremental(&mut conn, &entities)?;

    println!("Incremental update {} complete", report.run_id);
    println!("  new networks:      {}", report.network_count);
    println!("  memberships added: {}", report.membership_count);
    Ok(())
}

fn run_path(db_path: &Path, entity_args: &[String]) -> Result<()> {
    if entity_args.len() != 2 {
        bail!("path mode needs exactly two entities as type:id");
    }
    let from = EntityRef::parse(&entity_args[0])
        .with_context(|| format!("invalid entity '{}'", entity_args[0]))?;
    let to = EntityRef::parse(&entity_args[1])
        .with_context(|| format!("invalid entity '{}'", entity_args[1]))?;

    let conn = open_database(db_path)?;
    let cancel = CancellationToken::new();
    let universe = EdgeUniverse::collect(&conn, &cancel)?;

    let policy = ClusteringPolicy::default();
    let hub_report = HubClassifier::new(&policy).classify(&universe.edges);
    let query = PathQuery::new(&universe.edges, Some(&hub_report));

    match query.shortest_path(&from, &to) {
        Some(hops) => {
            println!("{from}");
            for hop in hops {
                match &hop.shared_value {
                    Some(value) => println!("  --[{} = {}]--> {}", hop.kind, value, hop.entity),
                    None => println!("  --[{}]--> {}", hop.kind, hop.entity),
                }
            }
        }
        None => {
            println!("No connection between {from} and {to} in the clustering view");
            // Second look without suppression, to tell "no path" apart
            // from "path runs through a hub".
            let raw = PathQuery::new(&universe.edges, None);
            if raw.shortest_path(&from, &to).is_some() {
                println!("(a path exists but runs through suppressed hubs)");
            }
        }
    }
    Ok(())
}

fn run_audit(db_path: &Path, rest: &[String]) -> Result<()> {
    if rest.is_empty() {
        bail!("audit mode needs an output directory");
    }
    let out_dir = PathBuf::from(&rest[0]);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let policy = load_policy(rest.get(1).map(Path::new))?;

    let conn = open_database(db_path)?;
    let cancel = CancellationToken::new();
    let universe = EdgeUniverse::collect(&conn, &cancel)?;
    let hub_report = HubClassifier::new(&policy).classify(&universe.edges);

    let hubs_path = out_dir.join("hub_report.csv");
    let hubs_written = audit::export_hub_report(&hub_report.entries, &hubs_path)?;
    println!("Wrote {} hub entries to {}", hubs_written, hubs_path.display());

    let networks_path = out_dir.join("networks.csv");
    let networks_written = audit::export_networks(&conn, &networks_path)?;
    println!(
        "Wrote {} networks to {}",
        networks_written,
        networks_path.display()
    );
    Ok(())
}
