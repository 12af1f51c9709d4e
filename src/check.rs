//! Typed checks and per-test run state.
//!
//! A [`RunContext`] is handed to every test invocation, freshly reset. Checks
//! record a failure on it (the first one emits the FAILED header, later ones
//! only append their own block) and return [`Err(Aborted)`](crate::Aborted)
//! so the test body can stop with `?`. The runner reads the failed flag back
//! after the call and flushes the buffered diagnostics.
//!
//! The `expect_*!` macros wrap the check methods with expression capture and
//! caller location, so a failure reports the source line and both operand
//! expressions next to their values.

use std::{fmt::Write as _, panic::Location};

use crate::test::{Aborted, Check};

/// Relative tolerance used by the `expect_float_*!` forms without explicit
/// tolerances.
pub const DEFAULT_REL_TOL: f64 = 1e-10;

/// Absolute tolerance used by the `expect_float_*!` forms without explicit
/// tolerances.
pub const DEFAULT_ABS_TOL: f64 = 1e-12;

/// Comparison requested by a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn describe(self) -> &'static str {
        match self {
            CmpOp::Eq => "equal to",
            CmpOp::Ne => "not equal to",
            CmpOp::Lt => "less than",
            CmpOp::Le => "less than or equal to",
            CmpOp::Gt => "greater than",
            CmpOp::Ge => "greater than or equal to",
        }
    }

    fn holds<T: PartialOrd>(self, a: &T, b: &T) -> bool {
        match self {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    }
}

/// Ephemeral per-test state: the failed flag and the buffered failure
/// diagnostics the runner flushes after the test returns.
#[derive(Debug, Default)]
pub struct RunContext {
    pub(crate) failed: bool,
    pub(crate) diag: String,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any check has failed during this test so far.
    pub fn failed(&self) -> bool {
        self.failed
    }

    fn fail_header(&mut self, loc: &Location<'_>) {
        if !self.failed {
            self.failed = true;
            self.diag.push_str("FAILED\n");
        }
        let _ = writeln!(
            self.diag,
            "  Assertion failed at {} line {}:",
            short_file(loc.file()),
            loc.line()
        );
    }

    fn note_message(&mut self, msg: Option<String>) {
        if let Some(msg) = msg {
            let _ = writeln!(self.diag, "  Message: {msg}");
        }
    }

    #[track_caller]
    pub fn check_bool(
        &mut self,
        actual: bool,
        actual_expr: &str,
        expected: bool,
        msg: Option<String>,
    ) -> Check {
        if actual == expected {
            return Ok(());
        }
        self.fail_header(Location::caller());
        let _ = writeln!(
            self.diag,
            "  Expected {actual_expr} (which is {actual}) to be {expected}"
        );
        self.note_message(msg);
        Err(Aborted)
    }

    #[track_caller]
    pub fn check_int(
        &mut self,
        a: i64,
        b: i64,
        op: CmpOp,
        a_expr: &str,
        b_expr: &str,
        msg: Option<String>,
    ) -> Check {
        if op.holds(&a, &b) {
            return Ok(());
        }
        self.fail_header(Location::caller());
        let _ = writeln!(self.diag, "  Expected {a_expr} (which is {a})");
        let _ = writeln!(
            self.diag,
            "  to be {} {b_expr} (which is {b})",
            op.describe()
        );
        self.note_message(msg);
        Err(Aborted)
    }

    #[track_caller]
    pub fn check_uint(
        &mut self,
        a: u64,
        b: u64,
        op: CmpOp,
        a_expr: &str,
        b_expr: &str,
        msg: Option<String>,
    ) -> Check {
        if op.holds(&a, &b) {
            return Ok(());
        }
        self.fail_header(Location::caller());
        let _ = writeln!(self.diag, "  Expected {a_expr} (which is {a})");
        let _ = writeln!(
            self.diag,
            "  to be {} {b_expr} (which is {b})",
            op.describe()
        );
        self.note_message(msg);
        Err(Aborted)
    }

    /// Only [`CmpOp::Eq`] and [`CmpOp::Ne`] are meaningful for pointers;
    /// other operators never hold.
    #[track_caller]
    pub fn check_ptr(
        &mut self,
        a: *const (),
        b: *const (),
        op: CmpOp,
        a_expr: &str,
        b_expr: &str,
        msg: Option<String>,
    ) -> Check {
        let holds = match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            _ => false,
        };
        if holds {
            return Ok(());
        }
        self.fail_header(Location::caller());
        let _ = writeln!(self.diag, "  Expected {a_expr} (which is {a:p})");
        let _ = writeln!(
            self.diag,
            "  to be {} {b_expr} (which is {b:p})",
            op.describe()
        );
        self.note_message(msg);
        Err(Aborted)
    }

    #[track_caller]
    pub fn check_ptr_null(
        &mut self,
        a: *const (),
        expect_null: bool,
        a_expr: &str,
        msg: Option<String>,
    ) -> Check {
        if a.is_null() == expect_null {
            return Ok(());
        }
        self.fail_header(Location::caller());
        if expect_null {
            let _ = writeln!(self.diag, "  Expected {a_expr} (which is {a:p}) to be null");
        } else {
            let _ = writeln!(self.diag, "  Expected {a_expr} (which is null) to be not null");
        }
        self.note_message(msg);
        Err(Aborted)
    }

    /// Byte-string comparison. With `len`, both operands are truncated to the
    /// first `len` bytes before comparing. Only [`CmpOp::Eq`] and
    /// [`CmpOp::Ne`] are meaningful.
    #[track_caller]
    pub fn check_str(
        &mut self,
        a: &str,
        b: &str,
        len: Option<usize>,
        op: CmpOp,
        a_expr: &str,
        b_expr: &str,
        msg: Option<String>,
    ) -> Check {
        let (lhs, rhs) = match len {
            Some(n) => (byte_prefix(a, n), byte_prefix(b, n)),
            None => (a.as_bytes(), b.as_bytes()),
        };
        let holds = match op {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            _ => false,
        };
        if holds {
            return Ok(());
        }
        self.fail_header(Location::caller());
        match len {
            None => {
                let _ = writeln!(self.diag, "  Expected {a_expr} (which is \"{a}\")");
                let _ = writeln!(
                    self.diag,
                    "  to be {} {b_expr} (which is \"{b}\")",
                    op.describe()
                );
            }
            Some(n) => {
                let _ = writeln!(
                    self.diag,
                    "  Expected first {n} bytes of {a_expr} (which is \"{}\")",
                    String::from_utf8_lossy(lhs)
                );
                let _ = writeln!(
                    self.diag,
                    "  to be {} first {n} bytes of {b_expr} (which is \"{}\")",
                    op.describe(),
                    String::from_utf8_lossy(rhs)
                );
            }
        }
        self.note_message(msg);
        Err(Aborted)
    }

    /// Tolerance-aware floating point comparison.
    ///
    /// The effective tolerance is `max(abs_tol, rel_tol * max(|a|, |b|))`;
    /// equality holds iff `|a - b|` stays within it, and the ordering
    /// operators are widened by it.
    #[track_caller]
    pub fn check_float(
        &mut self,
        a: f64,
        b: f64,
        rel_tol: f64,
        abs_tol: f64,
        op: CmpOp,
        a_expr: &str,
        b_expr: &str,
        msg: Option<String>,
    ) -> Check {
        let tol = abs_tol.max(rel_tol * a.abs().max(b.abs()));
        let eq = a - b <= tol && b - a <= tol;
        let lt = a < b + tol;
        let gt = a + tol > b;
        let holds = match op {
            CmpOp::Eq => eq,
            CmpOp::Ne => !eq,
            CmpOp::Lt => lt,
            CmpOp::Le => lt || eq,
            CmpOp::Gt => gt,
            CmpOp::Ge => gt || eq,
        };
        if holds {
            return Ok(());
        }
        self.fail_header(Location::caller());
        let _ = writeln!(self.diag, "  Expected {a_expr} (which is {a})");
        let _ = writeln!(
            self.diag,
            "  to be {} {b_expr} (which is {b})",
            op.describe()
        );
        self.note_message(msg);
        Err(Aborted)
    }
}

fn short_file(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn byte_prefix(s: &str, n: usize) -> &[u8] {
    &s.as_bytes()[..s.len().min(n)]
}

#[doc(hidden)]
pub fn ptr_of<T: ?Sized>(p: *const T) -> *const () {
    p.cast()
}

#[doc(hidden)]
#[macro_export]
macro_rules! __msg {
    () => {
        ::std::option::Option::None
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        ::std::option::Option::Some(::std::format!($fmt $(, $arg)*))
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __expect_int {
    ($op:ident, $cx:expr, $a:expr, $b:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $cx.check_int(
            ($a) as i64,
            ($b) as i64,
            $crate::check::CmpOp::$op,
            ::std::stringify!($a),
            ::std::stringify!($b),
            $crate::__msg!($($fmt $(, $arg)*)?),
        )?
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __expect_uint {
    ($op:ident, $cx:expr, $a:expr, $b:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $cx.check_uint(
            ($a) as u64,
            ($b) as u64,
            $crate::check::CmpOp::$op,
            ::std::stringify!($a),
            ::std::stringify!($b),
            $crate::__msg!($($fmt $(, $arg)*)?),
        )?
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __expect_float {
    ($op:ident, $cx:expr, $a:expr, $b:expr, $rel:expr, $abs:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $cx.check_float(
            ($a) as f64,
            ($b) as f64,
            $rel,
            $abs,
            $crate::check::CmpOp::$op,
            ::std::stringify!($a),
            ::std::stringify!($b),
            $crate::__msg!($($fmt $(, $arg)*)?),
        )?
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __expect_str {
    ($op:ident, $len:expr, $cx:expr, $a:expr, $b:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $cx.check_str(
            ::std::convert::AsRef::<str>::as_ref(&$a),
            ::std::convert::AsRef::<str>::as_ref(&$b),
            $len,
            $crate::check::CmpOp::$op,
            ::std::stringify!($a),
            ::std::stringify!($b),
            $crate::__msg!($($fmt $(, $arg)*)?),
        )?
    };
}

/// Check that a boolean expression is true; stops the test otherwise.
#[macro_export]
macro_rules! expect {
    ($($t:tt)+) => { $crate::expect_true!($($t)+) };
}

#[macro_export]
macro_rules! expect_true {
    ($cx:expr, $cond:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $cx.check_bool(
            $cond,
            ::std::stringify!($cond),
            true,
            $crate::__msg!($($fmt $(, $arg)*)?),
        )?
    };
}

#[macro_export]
macro_rules! expect_false {
    ($cx:expr, $cond:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $cx.check_bool(
            $cond,
            ::std::stringify!($cond),
            false,
            $crate::__msg!($($fmt $(, $arg)*)?),
        )?
    };
}

#[macro_export]
macro_rules! expect_int_eq {
    ($($t:tt)+) => { $crate::__expect_int!(Eq, $($t)+) };
}

#[macro_export]
macro_rules! expect_int_ne {
    ($($t:tt)+) => { $crate::__expect_int!(Ne, $($t)+) };
}

#[macro_export]
macro_rules! expect_int_lt {
    ($($t:tt)+) => { $crate::__expect_int!(Lt, $($t)+) };
}

#[macro_export]
macro_rules! expect_int_le {
    ($($t:tt)+) => { $crate::__expect_int!(Le, $($t)+) };
}

#[macro_export]
macro_rules! expect_int_gt {
    ($($t:tt)+) => { $crate::__expect_int!(Gt, $($t)+) };
}

#[macro_export]
macro_rules! expect_int_ge {
    ($($t:tt)+) => { $crate::__expect_int!(Ge, $($t)+) };
}

#[macro_export]
macro_rules! expect_uint_eq {
    ($($t:tt)+) => { $crate::__expect_uint!(Eq, $($t)+) };
}

#[macro_export]
macro_rules! expect_uint_ne {
    ($($t:tt)+) => { $crate::__expect_uint!(Ne, $($t)+) };
}

#[macro_export]
macro_rules! expect_uint_lt {
    ($($t:tt)+) => { $crate::__expect_uint!(Lt, $($t)+) };
}

#[macro_export]
macro_rules! expect_uint_le {
    ($($t:tt)+) => { $crate::__expect_uint!(Le, $($t)+) };
}

#[macro_export]
macro_rules! expect_uint_gt {
    ($($t:tt)+) => { $crate::__expect_uint!(Gt, $($t)+) };
}

#[macro_export]
macro_rules! expect_uint_ge {
    ($($t:tt)+) => { $crate::__expect_uint!(Ge, $($t)+) };
}

#[macro_export]
macro_rules! expect_ptr_eq {
    ($cx:expr, $a:expr, $b:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $cx.check_ptr(
            $crate::check::ptr_of($a),
            $crate::check::ptr_of($b),
            $crate::check::CmpOp::Eq,
            ::std::stringify!($a),
            ::std::stringify!($b),
            $crate::__msg!($($fmt $(, $arg)*)?),
        )?
    };
}

#[macro_export]
macro_rules! expect_ptr_ne {
    ($cx:expr, $a:expr, $b:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $cx.check_ptr(
            $crate::check::ptr_of($a),
            $crate::check::ptr_of($b),
            $crate::check::CmpOp::Ne,
            ::std::stringify!($a),
            ::std::stringify!($b),
            $crate::__msg!($($fmt $(, $arg)*)?),
        )?
    };
}

#[macro_export]
macro_rules! expect_ptr_null {
    ($cx:expr, $a:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $cx.check_ptr_null(
            $crate::check::ptr_of($a),
            true,
            ::std::stringify!($a),
            $crate::__msg!($($fmt $(, $arg)*)?),
        )?
    };
}

#[macro_export]
macro_rules! expect_ptr_not_null {
    ($cx:expr, $a:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $cx.check_ptr_null(
            $crate::check::ptr_of($a),
            false,
            ::std::stringify!($a),
            $crate::__msg!($($fmt $(, $arg)*)?),
        )?
    };
}

#[macro_export]
macro_rules! expect_str_eq {
    ($($t:tt)+) => { $crate::__expect_str!(Eq, ::std::option::Option::None, $($t)+) };
}

#[macro_export]
macro_rules! expect_str_ne {
    ($($t:tt)+) => { $crate::__expect_str!(Ne, ::std::option::Option::None, $($t)+) };
}

/// Compare only the first `$n` bytes of both strings.
#[macro_export]
macro_rules! expect_strn_eq {
    ($cx:expr, $a:expr, $b:expr, $n:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_str!(Eq, ::std::option::Option::Some($n), $cx, $a, $b $(, $fmt $(, $arg)*)?)
    };
}

#[macro_export]
macro_rules! expect_strn_ne {
    ($cx:expr, $a:expr, $b:expr, $n:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_str!(Ne, ::std::option::Option::Some($n), $cx, $a, $b $(, $fmt $(, $arg)*)?)
    };
}

#[macro_export]
macro_rules! expect_float_eq {
    ($cx:expr, $a:expr, $b:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_float!(
            Eq, $cx, $a, $b,
            $crate::check::DEFAULT_REL_TOL,
            $crate::check::DEFAULT_ABS_TOL
            $(, $fmt $(, $arg)*)?
        )
    };
}

#[macro_export]
macro_rules! expect_float_ne {
    ($cx:expr, $a:expr, $b:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_float!(
            Ne, $cx, $a, $b,
            $crate::check::DEFAULT_REL_TOL,
            $crate::check::DEFAULT_ABS_TOL
            $(, $fmt $(, $arg)*)?
        )
    };
}

#[macro_export]
macro_rules! expect_float_lt {
    ($cx:expr, $a:expr, $b:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_float!(
            Lt, $cx, $a, $b,
            $crate::check::DEFAULT_REL_TOL,
            $crate::check::DEFAULT_ABS_TOL
            $(, $fmt $(, $arg)*)?
        )
    };
}

#[macro_export]
macro_rules! expect_float_le {
    ($cx:expr, $a:expr, $b:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_float!(
            Le, $cx, $a, $b,
            $crate::check::DEFAULT_REL_TOL,
            $crate::check::DEFAULT_ABS_TOL
            $(, $fmt $(, $arg)*)?
        )
    };
}

#[macro_export]
macro_rules! expect_float_gt {
    ($cx:expr, $a:expr, $b:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_float!(
            Gt, $cx, $a, $b,
            $crate::check::DEFAULT_REL_TOL,
            $crate::check::DEFAULT_ABS_TOL
            $(, $fmt $(, $arg)*)?
        )
    };
}

#[macro_export]
macro_rules! expect_float_ge {
    ($cx:expr, $a:expr, $b:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_float!(
            Ge, $cx, $a, $b,
            $crate::check::DEFAULT_REL_TOL,
            $crate::check::DEFAULT_ABS_TOL
            $(, $fmt $(, $arg)*)?
        )
    };
}

#[macro_export]
macro_rules! expect_float_eq_tol {
    ($cx:expr, $a:expr, $b:expr, $rel:expr, $abs:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_float!(Eq, $cx, $a, $b, $rel, $abs $(, $fmt $(, $arg)*)?)
    };
}

#[macro_export]
macro_rules! expect_float_ne_tol {
    ($cx:expr, $a:expr, $b:expr, $rel:expr, $abs:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_float!(Ne, $cx, $a, $b, $rel, $abs $(, $fmt $(, $arg)*)?)
    };
}

#[macro_export]
macro_rules! expect_float_lt_tol {
    ($cx:expr, $a:expr, $b:expr, $rel:expr, $abs:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_float!(Lt, $cx, $a, $b, $rel, $abs $(, $fmt $(, $arg)*)?)
    };
}

#[macro_export]
macro_rules! expect_float_le_tol {
    ($cx:expr, $a:expr, $b:expr, $rel:expr, $abs:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_float!(Le, $cx, $a, $b, $rel, $abs $(, $fmt $(, $arg)*)?)
    };
}

#[macro_export]
macro_rules! expect_float_gt_tol {
    ($cx:expr, $a:expr, $b:expr, $rel:expr, $abs:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_float!(Gt, $cx, $a, $b, $rel, $abs $(, $fmt $(, $arg)*)?)
    };
}

#[macro_export]
macro_rules! expect_float_ge_tol {
    ($cx:expr, $a:expr, $b:expr, $rel:expr, $abs:expr $(, $fmt:literal $(, $arg:expr)*)? $(,)?) => {
        $crate::__expect_float!(Ge, $cx, $a, $b, $rel, $abs $(, $fmt $(, $arg)*)?)
    };
}
