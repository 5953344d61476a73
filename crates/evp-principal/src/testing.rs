//! Fixture job shared by the unit tests.
//!
//! The job runs process `p2` over input written by process `p1`. Catalog:
//!
//! | unit  | type          | label   | process | notes                  |
//! |-------|---------------|---------|---------|------------------------|
//! | Event | Hits          | reco    | p1      | input                  |
//! | Event | Tracks        | reco    | p1      | input                  |
//! | Event | Hits          | prodA   | p2      | produced               |
//! | Event | Hits          | other   | p2      | produced               |
//! | Event | Hits          | maker   | p2      | produced, on-demand    |
//! | Event | Tracks        | prodA   | p2      | produced               |
//! | Event | HitCollection | coll    | p2      | produced, element Hit  |
//! | Run   | Hits          | summary | p2      | produced               |
//! | Run   | Hits          | totals  | p2      | produced               |

use std::sync::Arc;

use evp_registry::{JobConfig, JobContext, Lineage};
use evp_types::{
    BranchDescription, BranchKey, BranchType, ProcessConfiguration, ProcessHistory,
};

#[derive(Debug, PartialEq)]
pub struct Hits(pub Vec<u32>);

#[derive(Debug, PartialEq)]
pub struct Tracks(pub u32);

#[derive(Debug, PartialEq)]
pub struct Hit(pub u32);

#[derive(Debug, PartialEq)]
pub struct HitCollection(pub Vec<Hit>);

pub fn config() -> JobConfig {
    JobConfig::default().with_process_name("p2")
}

pub fn context() -> Arc<JobContext> {
    context_with(config())
}

pub fn context_with(config: JobConfig) -> Arc<JobContext> {
    let ctx = JobContext::new(config).unwrap();
    ctx.types()
        .register_mergeable::<Hits, _>("Hits", |a, b| a.0.extend_from_slice(&b.0))
        .unwrap();
    ctx.types().register_comparable::<Tracks>("Tracks").unwrap();
    ctx.types().register::<HitCollection>("HitCollection").unwrap();

    let branches = [
        ("Hits", "reco", "p1", BranchType::Event),
        ("Tracks", "reco", "p1", BranchType::Event),
        ("Hits", "prodA", "p2", BranchType::Event),
        ("Hits", "other", "p2", BranchType::Event),
        ("Hits", "maker", "p2", BranchType::Event),
        ("Tracks", "prodA", "p2", BranchType::Event),
        ("Hits", "summary", "p2", BranchType::Run),
        ("Hits", "totals", "p2", BranchType::Run),
    ];
    for (ty, label, process, bt) in branches {
        let mut d = BranchDescription::new(BranchKey::new(ty, label, "", process, bt), ty);
        if process == "p2" {
            d = d.produced();
        }
        ctx.add_branch(d).unwrap();
    }
    ctx.add_branch(
        BranchDescription::new(
            BranchKey::new("HitCollection", "coll", "", "p2", BranchType::Event),
            "HitCollection",
        )
        .produced()
        .with_element_type("Hit"),
    )
    .unwrap();

    ctx.freeze_catalog().unwrap();
    let input: Vec<_> = ["Hits", "Tracks"]
        .into_iter()
        .map(|ty| {
            ctx.catalog()
                .branch_id(&BranchKey::new(ty, "reco", "", "p1", BranchType::Event))
                .unwrap()
        })
        .collect();
    ctx.merge_input_lists(&[input], "input.evp").unwrap();
    ctx.finalize().unwrap();
    ctx.shared()
}

/// History of the input: one process, `p1`.
pub fn input_history() -> ProcessHistory {
    ProcessHistory::from_configurations(vec![ProcessConfiguration::new("p1", "1.0", "")])
}

/// Lineage of an input event: the `p1` list only.
pub fn input_lineage(ctx: &Arc<JobContext>) -> Lineage {
    let reco = description(ctx, "Hits", "reco", "p1");
    let (list, _) = ctx.branch_lists().index_of(reco.branch_id()).unwrap();
    Lineage::new(vec![list])
}

/// The registered description with this type, label and process, for
/// whichever unit kind has it.
pub fn description(
    ctx: &Arc<JobContext>,
    ty: &str,
    label: &str,
    process: &str,
) -> Arc<BranchDescription> {
    BranchType::ALL
        .iter()
        .find_map(|bt| {
            ctx.catalog()
                .description_for(&BranchKey::new(ty, label, "", process, *bt))
        })
        .unwrap()
}
