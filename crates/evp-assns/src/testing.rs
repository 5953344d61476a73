//! Fixture job for the unit tests: process `p2` over input from `p1`.
//!
//! Event branches: `Tracks`/`Hits` labelled `tracks`/`hits` for both
//! processes, `Tracks`/`Hits` labelled `mixed` and `TrackHitAssns`
//! labelled `assoc` for `p2` only.

use std::sync::Arc;

use evp_principal::{Principal, UnitAux};
use evp_registry::{JobConfig, JobContext, Lineage};
use evp_types::{
    BranchDescription, BranchKey, BranchType, EventId, ProcessConfiguration, ProcessHistory,
};

use crate::assns::Assns;
use crate::ptr::Ptr;

#[derive(Clone, Debug, PartialEq)]
pub struct Track(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub struct Hit(pub u32);

pub fn context() -> Arc<JobContext> {
    let ctx = JobContext::new(JobConfig::default().with_process_name("p2")).unwrap();
    ctx.types().register::<Vec<Track>>("Tracks").unwrap();
    ctx.types().register::<Vec<Hit>>("Hits").unwrap();
    ctx.types()
        .register_mergeable::<Assns<Track, Hit>, _>("TrackHitAssns", |a, b| {
            let _ = a.aggregate(b);
        })
        .unwrap();

    let branches = [
        ("Tracks", "tracks", "p1"),
        ("Hits", "hits", "p1"),
        ("Tracks", "tracks", "p2"),
        ("Hits", "hits", "p2"),
        ("Tracks", "mixed", "p2"),
        ("Hits", "mixed", "p2"),
        ("TrackHitAssns", "assoc", "p2"),
    ];
    for (ty, label, process) in branches {
        let mut d = BranchDescription::new(
            BranchKey::new(ty, label, "", process, BranchType::Event),
            ty,
        );
        if process == "p2" {
            d = d.produced();
        }
        ctx.add_branch(d).unwrap();
    }

    ctx.freeze_catalog().unwrap();
    let input: Vec<_> = [("Tracks", "tracks"), ("Hits", "hits")]
        .into_iter()
        .map(|(ty, label)| {
            ctx.catalog()
                .branch_id(&BranchKey::new(ty, label, "", "p1", BranchType::Event))
                .unwrap()
        })
        .collect();
    ctx.merge_input_lists(&[input], "input.evp").unwrap();
    ctx.finalize().unwrap();
    ctx.shared()
}

/// An event read from the `p1` input and extended by `p2`.
pub fn event(ctx: &Arc<JobContext>) -> Principal {
    let first = description_in(ctx, "Tracks", "tracks", "p1");
    let (list, _) = ctx.branch_lists().index_of(first.branch_id()).unwrap();
    Principal::builder(ctx.clone(), UnitAux::Event(EventId::new(1, 1, 1)))
        .history(ProcessHistory::from_configurations(vec![
            ProcessConfiguration::new("p1", "1.0", ""),
        ]))
        .lineage(Lineage::new(vec![list]))
        .build()
        .unwrap()
}

pub fn put_tracks(event: &Principal, n: u32) -> Vec<Ptr<Track>> {
    let desc = description(event.context(), "Tracks", "tracks");
    let pid = event
        .put_value((0..n).map(Track).collect::<Vec<_>>(), &desc, vec![])
        .unwrap();
    (0..n as usize).map(|k| Ptr::new(pid, k)).collect()
}

pub fn put_hits(event: &Principal, n: u32) -> Vec<Ptr<Hit>> {
    let desc = description(event.context(), "Hits", "hits");
    let pid = event
        .put_value((0..n).map(Hit).collect::<Vec<_>>(), &desc, vec![])
        .unwrap();
    (0..n as usize).map(|k| Ptr::new(pid, k)).collect()
}

/// A `p2` event branch.
pub fn description(ctx: &Arc<JobContext>, ty: &str, label: &str) -> Arc<BranchDescription> {
    description_in(ctx, ty, label, "p2")
}

pub fn description_in(
    ctx: &Arc<JobContext>,
    ty: &str,
    label: &str,
    process: &str,
) -> Arc<BranchDescription> {
    ctx.catalog()
        .description_for(&BranchKey::new(ty, label, "", process, BranchType::Event))
        .unwrap()
}
