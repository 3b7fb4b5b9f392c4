//! Randomized whole-engine properties.
//!
//! Each case drives the engine with an arbitrary command stream and then
//! checks the run against an independent oracle: reads must come from
//! the global committed history at the reader's snapshot, overlapping
//! writers of one variable must not both commit, the committed
//! dependency graph must stay acyclic, and no committed writer may span
//! a failure of a site it touched.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use repsim_engine::{Notice, Stamp, TransactionManager, TxnStatus, VarId};

// ---------------------------------------------------------------------------
// Command stream generation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Cmd {
    Begin { txn: u8, read_only: bool },
    Read { txn: u8, var: u8 },
    Write { txn: u8, var: u8, value: i64 },
    End { txn: u8 },
    Fail { site: u8 },
    Recover { site: u8 },
}

fn txn_name(index: u8) -> String {
    format!("T{index}")
}

fn var_name(index: u8) -> String {
    format!("x{index}")
}

fn cmd_strategy() -> impl Strategy<Value = Cmd> {
    prop_oneof![
        2 => (0u8..6, any::<bool>()).prop_map(|(txn, read_only)| Cmd::Begin { txn, read_only }),
        4 => (0u8..6, 1u8..=20).prop_map(|(txn, var)| Cmd::Read { txn, var }),
        4 => (0u8..6, 1u8..=20, -100i64..100).prop_map(|(txn, var, value)| Cmd::Write {
            txn,
            var,
            value
        }),
        2 => (0u8..6).prop_map(|txn| Cmd::End { txn }),
        1 => (1u8..=10).prop_map(|site| Cmd::Fail { site }),
        1 => (1u8..=10).prop_map(|site| Cmd::Recover { site }),
    ]
}

fn stream_strategy() -> impl Strategy<Value = Vec<Cmd>> {
    prop::collection::vec(cmd_strategy(), 1..80)
}

// ---------------------------------------------------------------------------
// Oracle: replayed observations
// ---------------------------------------------------------------------------

/// One successful read observed during the run, attributed to the
/// transaction that issued it.
#[derive(Debug)]
struct ReadObs {
    txn: String,
    var: VarId,
    value: i64,
}

/// Everything the harness learned by watching notices.
#[derive(Debug, Default)]
struct RunLog {
    reads: Vec<ReadObs>,
    /// Buffered writes per transaction, last write wins.
    buffered: BTreeMap<String, BTreeMap<VarId, i64>>,
    /// Global committed history per variable, in commit order.
    history: BTreeMap<VarId, Vec<(Stamp, i64)>>,
}

/// Oracle value of `var` at snapshot `ts`: the newest globally committed
/// version at or before `ts`, or the initial value.
fn oracle_value(log: &RunLog, var: VarId, ts: Stamp) -> i64 {
    log.history
        .get(&var)
        .into_iter()
        .flatten()
        .rev()
        .find(|(committed_at, _)| *committed_at <= ts)
        .map_or_else(|| var.initial_value(), |(_, value)| *value)
}

fn drive(stream: &[Cmd]) -> (TransactionManager, RunLog) {
    let mut tm = TransactionManager::new();
    let mut log = RunLog::default();

    for cmd in stream {
        match cmd {
            Cmd::Begin { txn, read_only } => {
                tm.begin(&txn_name(*txn), *read_only);
            }
            Cmd::Read { txn, var } => {
                let name = txn_name(*txn);
                let notices = tm.read(&name, &var_name(*var));
                for notice in notices {
                    if let Notice::Value { var, value } = notice {
                        log.reads.push(ReadObs {
                            txn: name.clone(),
                            var,
                            value,
                        });
                    }
                }
            }
            Cmd::Write { txn, var, value } => {
                let name = txn_name(*txn);
                let notices = tm.write(&name, &var_name(*var), *value);
                if matches!(notices.first(), Some(Notice::Buffered { .. })) {
                    log.buffered
                        .entry(name)
                        .or_default()
                        .insert(VarId::new(*var).unwrap(), *value);
                }
            }
            Cmd::End { txn } => {
                let name = txn_name(*txn);
                let notices = tm.end(&name);
                if matches!(
                    notices.first(),
                    Some(Notice::Committed {
                        read_only: false,
                        ..
                    })
                ) {
                    let commit = tm
                        .transaction(&name)
                        .and_then(|t| t.commit_stamp())
                        .expect("rw commit has a stamp");
                    if let Some(writes) = log.buffered.get(&name) {
                        for (&var, &value) in writes {
                            log.history.entry(var).or_default().push((commit, value));
                        }
                    }
                }
            }
            Cmd::Fail { site } => {
                tm.fail_site(u64::from(*site));
            }
            Cmd::Recover { site } => {
                let before = tm.parked_entries();
                let notices = tm.recover_site(u64::from(*site));
                let after: BTreeSet<_> = tm.parked_entries().into_iter().collect();
                let mut served = before.into_iter().filter(|entry| !after.contains(entry));
                for notice in notices {
                    if let Notice::Value { var, value } = notice {
                        let (txn, served_var, _) =
                            served.next().expect("one served entry per value notice");
                        assert_eq!(served_var, var);
                        log.reads.push(ReadObs { txn, var, value });
                    }
                }
            }
        }
    }
    (tm, log)
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    /// Every successful read returns the newest globally committed
    /// version at or before the reader's start stamp.
    #[test]
    fn prop_reads_come_from_the_snapshot(stream in stream_strategy()) {
        let (tm, log) = drive(&stream);
        for obs in &log.reads {
            let start = tm.transaction(&obs.txn).expect("reader exists").start();
            let expected = oracle_value(&log, obs.var, start);
            prop_assert_eq!(
                obs.value,
                expected,
                "{} read {} at {}",
                &obs.txn,
                obs.var,
                start
            );
        }
    }

    /// First-committer-wins: two committed transactions with overlapping
    /// lifetimes never both wrote the same variable.
    #[test]
    fn prop_overlapping_writers_do_not_both_commit(stream in stream_strategy()) {
        let (tm, log) = drive(&stream);
        let committed: Vec<&str> = log
            .buffered
            .keys()
            .map(String::as_str)
            .filter(|name| {
                tm.transaction(name).is_some_and(|t| t.status() == TxnStatus::Committed)
            })
            .collect();

        for (i, a) in committed.iter().enumerate() {
            for b in &committed[i + 1..] {
                let ta = tm.transaction(a).unwrap();
                let tb = tm.transaction(b).unwrap();
                let ca = ta.commit_stamp().unwrap();
                let cb = tb.commit_stamp().unwrap();
                let overlap = ta.start() < cb && tb.start() < ca;
                if !overlap {
                    continue;
                }
                let shared: Vec<_> = ta
                    .write_set()
                    .keys()
                    .filter(|var| tb.write_set().contains_key(var))
                    .collect();
                prop_assert!(
                    shared.is_empty(),
                    "{a} and {b} overlap and both committed writes to {shared:?}"
                );
            }
        }
    }

    /// The dependency graph restricted to committed transactions is
    /// acyclic.
    #[test]
    fn prop_committed_graph_is_acyclic(stream in stream_strategy()) {
        let (tm, log) = drive(&stream);
        let names: Vec<String> = log
            .buffered
            .keys()
            .cloned()
            .chain(log.reads.iter().map(|obs| obs.txn.clone()))
            .collect();
        let committed: BTreeSet<String> = names
            .into_iter()
            .filter(|name| {
                tm.transaction(name).is_some_and(|t| t.status() == TxnStatus::Committed)
            })
            .collect();

        // Depth-first search over predecessor edges with an explicit
        // recursion stack; a back edge inside the committed set is a
        // cycle.
        let mut done: BTreeSet<&str> = BTreeSet::new();
        for root in &committed {
            if done.contains(root.as_str()) {
                continue;
            }
            let mut path: Vec<&str> = Vec::new();
            let mut on_path: BTreeSet<&str> = BTreeSet::new();
            let mut work: Vec<(&str, bool)> = vec![(root.as_str(), false)];
            while let Some((node, expanded)) = work.pop() {
                if expanded {
                    path.pop();
                    on_path.remove(node);
                    done.insert(node);
                    continue;
                }
                if done.contains(node) {
                    continue;
                }
                prop_assert!(
                    !on_path.contains(node),
                    "cycle through committed transaction {node}"
                );
                path.push(node);
                on_path.insert(node);
                work.push((node, true));
                if let Some(txn) = tm.transaction(node) {
                    for pred in txn.predecessors() {
                        if committed.contains(pred) {
                            work.push((pred.as_str(), false));
                        }
                    }
                }
            }
        }
    }

    /// No transaction commits across a failure of a site it wrote to.
    #[test]
    fn prop_no_commit_spans_a_touched_failure(stream in stream_strategy()) {
        let (tm, log) = drive(&stream);
        for name in log.buffered.keys() {
            let Some(txn) = tm.transaction(name) else { continue };
            if txn.status() != TxnStatus::Committed {
                continue;
            }
            let commit = txn.commit_stamp().unwrap();
            for &site in txn.sites_written() {
                for interval in tm.data().site(site).failure_intervals() {
                    let overlaps = interval.failed_at <= commit
                        && interval.recovered_at.map_or(true, |r| r >= txn.start());
                    prop_assert!(
                        !overlaps,
                        "{name} committed across failure of site {site}"
                    );
                }
            }
        }
    }

    /// Committing a write and reading it back from a fresh read-only
    /// transaction yields the written value when nothing interferes.
    #[test]
    fn prop_write_read_roundtrip(var in 1u8..=20, value in -1000i64..1000) {
        let mut tm = TransactionManager::new();
        tm.begin("W", false);
        tm.write("W", &var_name(var), value);
        tm.end("W");
        tm.begin("R", true);
        let notices = tm.read("R", &var_name(var));
        prop_assert_eq!(
            notices,
            vec![Notice::Value {
                var: VarId::new(var).unwrap(),
                value
            }]
        );
        tm.end("R");
    }
}
