//! End-to-end embedding of grovetest: a counting allocator, lifecycle
//! fixtures, a few typed checks, and a `--filter=<expr>` flag.
//!
//! ```text
//! cargo run --example grouplifecycle -- --filter='asserttest/*,~*bounded'
//! ```

use std::{cell::Cell, env, process::ExitCode, rc::Rc, sync::Arc};

use grovetest::{
    Runner, TestTree,
    alloc::{AllocError, CountingAlloc},
    check::RunContext,
    expect_float_eq_tol, expect_int_eq, expect_int_ge, expect_int_lt, expect_strn_eq,
    test::Check,
};

fn build_tree(alloc: Arc<CountingAlloc>) -> Result<TestTree, AllocError> {
    let mut tree = TestTree::with_alloc(alloc)?;
    let root = tree.root();

    // The first group's fixtures bracket its own test; the sibling group,
    // registered afterwards, observes the value teardown left behind.
    let value = Rc::new(Cell::new(0));
    let lifecycle = tree.create_group(root, "grouplifecycle")?;
    let with = tree.create_group(lifecycle, "withlifecycle")?;
    let v = value.clone();
    tree.set_setup(with, move || v.set(666));
    let v = value.clone();
    tree.set_teardown(with, move || v.set(123));
    let v = value.clone();
    tree.add_test(with, "setup", move |cx: &mut RunContext| -> Check {
        expect_int_eq!(cx, v.get(), 666);
        Ok(())
    })?;
    let no = tree.create_group(lifecycle, "nolifecycle")?;
    let v = value.clone();
    tree.add_test(no, "torndown", move |cx: &mut RunContext| -> Check {
        expect_int_eq!(cx, v.get(), 123);
        Ok(())
    })?;

    let asserts = tree.create_group(root, "asserttest")?;
    let ints = tree.create_group(asserts, "int")?;
    tree.add_test(ints, "orderings", |cx: &mut RunContext| -> Check {
        expect_int_lt!(cx, -3, 5);
        expect_int_ge!(cx, 5, 5);
        Ok(())
    })?;
    let floats = tree.create_group(asserts, "double")?;
    tree.add_test(floats, "tolerance", |cx: &mut RunContext| -> Check {
        expect_float_eq_tol!(cx, 3.14159, 3.1415, 1e-4, 1e-12);
        Ok(())
    })?;
    let strs = tree.create_group(asserts, "str")?;
    tree.add_test(strs, "bounded", |cx: &mut RunContext| -> Check {
        expect_strn_eq!(cx, "grovetest", "grove", 5);
        Ok(())
    })?;

    Ok(tree)
}

fn main() -> ExitCode {
    env_logger::init();

    let filter = env::args().find_map(|arg| arg.strip_prefix("--filter=").map(str::to_owned));

    let alloc = Arc::new(CountingAlloc::new());
    let mut tree = match build_tree(alloc.clone()) {
        Ok(tree) => tree,
        Err(err) => {
            eprintln!("failed to build test tree: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut runner = Runner::new();
    if let Some(expr) = &filter {
        runner = runner.with_filter(expr);
    }
    let summary = match runner.run(&tree) {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("run aborted: {err}");
            return ExitCode::FAILURE;
        }
    };

    let root = tree.root();
    tree.release(root);
    if alloc.live_blocks() != 0 {
        eprintln!(
            "leak: {} block(s) ({} bytes) still live after release",
            alloc.live_blocks(),
            alloc.live_bytes()
        );
        return ExitCode::FAILURE;
    }

    ExitCode::from(summary)
}
