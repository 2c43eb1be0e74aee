//! End-to-end pipeline: wire bytes → decoded samples → histogram → render.
//!
//! Exercises the public surface the way the sampling and display loops
//! compose it, without needing an open counter.

use ptop::display::format::format_entries;
use ptop::display::{handle_event, Action};
use ptop::domain::Pid;
use ptop::events::sys;
use ptop::hist::{HistKey, HistTable, KeySymbol, SortSpec};
use ptop::sample::parse_sample;
use ptop::symbols::filter;

const SAMPLE_TYPE: u64 = sys::PERF_SAMPLE_IP | sys::PERF_SAMPLE_TID | sys::PERF_SAMPLE_PERIOD;

fn wire_sample(ip: u64, pid: u32, period: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&ip.to_ne_bytes());
    buf.extend_from_slice(&pid.to_ne_bytes());
    buf.extend_from_slice(&pid.to_ne_bytes());
    buf.extend_from_slice(&period.to_ne_bytes());
    buf
}

/// Stand-in for the resolver: a fixed ip → symbol mapping.
fn resolve_stub(ip: u64) -> Option<&'static str> {
    match ip {
        0x1000 => Some("symbol_a"),
        0x2000 => Some("symbol_b"),
        0x3000 => Some("native_safe_halt"),
        _ => None,
    }
}

fn aggregate(table: &mut HistTable, data: &[u8]) {
    let sample = parse_sample(data, SAMPLE_TYPE).expect("well-formed sample");
    let ip = sample.ip.unwrap();
    let symbol = resolve_stub(ip);
    if symbol.is_some_and(filter::is_ignorable) {
        return;
    }
    let key = HistKey {
        pid: sample.pid.unwrap_or(Pid(-1)),
        comm: "bench".to_string(),
        module: Some("bench-bin".to_string()),
        symbol: symbol.map_or(KeySymbol::Addr(ip), |s| KeySymbol::Name(s.to_string())),
    };
    table.record_sample(key, sample.period.unwrap());
}

#[test]
fn three_samples_rank_and_render() {
    let mut table = HistTable::new();
    aggregate(&mut table, &wire_sample(0x1000, 7, 10)); // A
    aggregate(&mut table, &wire_sample(0x2000, 7, 5)); // B
    aggregate(&mut table, &wire_sample(0x1000, 7, 7)); // A again

    table.collapse_and_resort(&SortSpec::default());
    let snap = table.snapshot(10);

    assert_eq!(snap.len(), 2);
    assert_eq!(snap[0].key.symbol.to_string(), "symbol_a");
    assert_eq!(snap[0].weight, 17);
    assert_eq!(snap[1].key.symbol.to_string(), "symbol_b");
    assert_eq!(snap[1].weight, 5);
    assert_eq!(table.total_period, 22);

    // render pass: 24x80 terminal leaves 21 data rows
    let lines = format_entries(&snap, table.total_period, 21, 80);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("symbol_a"));
    assert!(lines.iter().all(|l| l.chars().count() <= 80));
}

#[test]
fn ignored_symbols_never_reach_the_table() {
    let mut table = HistTable::new();
    aggregate(&mut table, &wire_sample(0x1000, 7, 10));
    aggregate(&mut table, &wire_sample(0x3000, 7, 1000)); // idle, dropped

    assert_eq!(table.total_period, 10);
    assert_eq!(table.nr_samples(), 1);
}

#[test]
fn unresolved_samples_fall_back_to_raw_addresses() {
    let mut table = HistTable::new();
    aggregate(&mut table, &wire_sample(0xdead_0000, 7, 3));
    table.collapse_and_resort(&SortSpec::default());
    let snap = table.snapshot(10);
    assert_eq!(snap[0].key.symbol, KeySymbol::Addr(0xdead_0000));
}

#[test]
fn quit_decision_does_not_touch_tables() {
    let mut table = HistTable::new();
    aggregate(&mut table, &wire_sample(0x1000, 7, 10));
    table.collapse_and_resort(&SortSpec::default());
    let before = table.snapshot(10);
    let total_before = table.total_period;

    use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
    let action = handle_event(&Event::Key(KeyEvent::new(
        KeyCode::Char('q'),
        KeyModifiers::NONE,
    )));
    assert_eq!(action, Action::Quit);

    // quitting is a pure decision: aggregation state is untouched
    assert_eq!(table.snapshot(10), before);
    assert_eq!(table.total_period, total_before);
}
