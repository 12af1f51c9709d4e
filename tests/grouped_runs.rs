use std::sync::Arc;

use grovetest::{
    RunSummary, Runner, TestTree, alloc::CountingAlloc, check::RunContext, expect_int_eq,
    expect_str_eq, test::Check,
};
use pretty_assertions::assert_eq;
use regex::Regex;

/// alpha/one, alpha/two, alpha/nested/three pass; beta/four fails.
fn sample_tree(alloc: Arc<CountingAlloc>) -> TestTree {
    let mut tree = TestTree::with_alloc(alloc).unwrap();
    let root = tree.root();

    let alpha = tree.create_group(root, "alpha").unwrap();
    tree.add_test(alpha, "one", |cx: &mut RunContext| -> Check {
        expect_int_eq!(cx, 1, 1);
        Ok(())
    })
    .unwrap();
    tree.add_test(alpha, "two", |cx: &mut RunContext| -> Check {
        expect_str_eq!(cx, "two", "two");
        Ok(())
    })
    .unwrap();

    let nested = tree.create_group(alpha, "nested").unwrap();
    tree.add_test(nested, "three", |_cx: &mut RunContext| {}).unwrap();

    let beta = tree.create_group(root, "beta").unwrap();
    tree.add_test(beta, "four", |cx: &mut RunContext| -> Check {
        expect_int_eq!(cx, 2 + 2, 5);
        Ok(())
    })
    .unwrap();

    tree
}

fn run(tree: &TestTree, filter: Option<&str>) -> (RunSummary, String) {
    let mut out = Vec::new();
    let mut runner = Runner::new().with_output(&mut out);
    if let Some(expr) = filter {
        runner = runner.with_filter(expr);
    }
    let summary = runner.run(tree).unwrap();
    (summary, String::from_utf8(out).unwrap())
}

#[test]
fn unfiltered_run_covers_the_whole_tree_in_order() {
    let tree = sample_tree(Arc::new(CountingAlloc::new()));
    let (summary, out) = run(&tree, None);

    assert_eq!(summary, RunSummary { run: 4, failed: 1, filtered: 0 });

    let one = out.find("alpha/one").unwrap();
    let two = out.find("alpha/two").unwrap();
    let three = out.find("alpha/nested/three").unwrap();
    let four = out.find("beta/four").unwrap();
    assert!(one < two && two < three && three < four);

    assert!(out.contains("1 test(s) out of 4 failed.\n"));
    assert!(!out.contains("filtered out"));
}

#[test]
fn failure_block_reports_location_and_operands() {
    let tree = sample_tree(Arc::new(CountingAlloc::new()));
    let (_, out) = run(&tree, None);

    let failed_line = Regex::new(r"(?m)^beta/four +=> FAILED$").unwrap();
    assert!(failed_line.is_match(&out));
    assert!(out.contains("  Assertion failed at grouped_runs.rs line"));
    assert!(out.contains("  Expected 2 + 2 (which is 4)\n"));
    assert!(out.contains("  to be equal to 5 (which is 5)\n"));
}

#[test]
fn prefix_filter_scopes_the_run() {
    let tree = sample_tree(Arc::new(CountingAlloc::new()));
    let (summary, out) = run(&tree, Some("alpha/*"));

    assert_eq!(summary, RunSummary { run: 3, failed: 0, filtered: 1 });
    assert!(summary.success());
    assert!(out.contains("Applying test filter: alpha/*\n"));
    assert!(out.contains("All 3 tests passed.\n"));
    assert!(out.contains("1 test(s) were filtered out.\n"));
    assert!(!out.contains("beta/four"));
}

#[test]
fn suffix_filter_picks_single_test() {
    let tree = sample_tree(Arc::new(CountingAlloc::new()));
    let (summary, out) = run(&tree, Some("*three"));

    assert_eq!(summary, RunSummary { run: 1, failed: 0, filtered: 3 });
    assert!(out.contains("alpha/nested/three"));
    assert!(out.contains("3 test(s) were filtered out.\n"));
}

#[test]
fn negated_clause_excludes_despite_positive_match() {
    let tree = sample_tree(Arc::new(CountingAlloc::new()));
    let (summary, out) = run(&tree, Some("alpha/*,~*three"));

    assert_eq!(summary, RunSummary { run: 2, failed: 0, filtered: 2 });
    assert!(out.contains("alpha/one"));
    assert!(out.contains("alpha/two"));
    assert!(!out.contains("alpha/nested/three"));
}

#[test]
fn full_match_filter_runs_exactly_one_path() {
    let tree = sample_tree(Arc::new(CountingAlloc::new()));
    let (summary, out) = run(&tree, Some("beta/four"));

    assert_eq!(summary, RunSummary { run: 1, failed: 1, filtered: 3 });
    assert!(!summary.success());
    assert!(out.contains("1 test(s) out of 1 failed.\n"));
}

#[test]
fn filtered_runs_and_release_settle_the_allocator() {
    let alloc = Arc::new(CountingAlloc::new());
    let mut tree = sample_tree(alloc.clone());
    let live_after_build = alloc.live_blocks();
    assert!(live_after_build > 0);

    // two runs, one filtered: the per-run filter table must be credited back
    run(&tree, None);
    run(&tree, Some("alpha/*,~*three"));
    assert_eq!(alloc.live_blocks(), live_after_build);

    let root = tree.root();
    tree.release(root);
    assert_eq!(alloc.live_blocks(), 0);
    assert_eq!(alloc.live_bytes(), 0);
}

#[test]
fn progress_lines_keep_a_fixed_layout() {
    let tree = sample_tree(Arc::new(CountingAlloc::new()));
    let (_, out) = run(&tree, Some("alpha/one"));

    let expected = format!(
        "Applying test filter: alpha/one\n{:<65} => OK\nAll 1 tests passed.\n3 test(s) were filtered out.\n",
        "alpha/one"
    );
    assert_eq!(out, expected);
}
