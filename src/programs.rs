//! Example loops.
//!
//! Four small loops over two integer variables `x` and `y`, each with pre-state index 1 and
//! post-state index 2. [`example1`] has a piecewise linear body and needs the invariant
//! `x <= y + 16`. The others have a disjunctive pre- and postcondition, a fixed initial state,
//! and a loop that can only exit after `y` has turned positive.

use crate::expr::Expr;
use crate::program::{ProgramSpec, StateVar};

fn x1() -> Expr {
    Expr::ssa("x", 1)
}

fn y1() -> Expr {
    Expr::ssa("y", 1)
}

fn x2() -> Expr {
    Expr::ssa("x", 2)
}

fn y2() -> Expr {
    Expr::ssa("y", 2)
}

fn state_vars() -> Vec<StateVar> {
    vec![StateVar::new("x", 1, 2), StateVar::new("y", 1, 2)]
}

/// ```text
/// assume(x < y);
/// while (x < y) {
///     if (x < 0) x += 7; else x += 10;
///     if (y < 0) y -= 10; else y += 3;
/// }
/// assert(y <= x && x <= y + 16);
/// ```
pub fn example1() -> ProgramSpec {
    let body = Expr::and([
        Expr::ite(
            x1().lt(0),
            x2().equals(x1() + 7),
            x2().equals(x1() + 10),
        ),
        Expr::ite(
            y1().lt(0),
            y2().equals(y1() - 10),
            y2().equals(y1() + 3),
        ),
    ]);
    ProgramSpec::new(
        state_vars(),
        x1().lt(y1()),
        x1().lt(y1()),
        body,
        y2().le(x2()) & x2().le(y2() + 16),
    )
    .with_paths(vec![x1().lt(0), y1().lt(0)])
}

/// ```text
/// assume(x > 0 || y > 0);
/// while (x + y <= -2) {
///     if (x > 0) x += 1; else y += 1;
/// }
/// assert(x > 0 || y > 0);
/// ```
pub fn example2() -> ProgramSpec {
    let body = Expr::ite(
        x1().gt(0),
        x2().equals(x1() + 1) & y2().equals(y1()),
        y2().equals(y1() + 1) & x2().equals(x1()),
    );
    ProgramSpec::new(
        state_vars(),
        x1().gt(0) | y1().gt(0),
        (x1() + y1()).le(-2),
        body,
        x2().gt(0) | y2().gt(0),
    )
    .with_paths(vec![x1().gt(0)])
}

/// ```text
/// x = 1; y = 0;
/// while (x < 3) { x += y; y += 1; }
/// assert(x >= y);
/// ```
pub fn example3() -> ProgramSpec {
    ProgramSpec::new(
        state_vars(),
        x1().equals(1) & y1().equals(0),
        x1().lt(3),
        x2().equals(x1() + y1()) & y2().equals(y1() + 1),
        x2().ge(y2()),
    )
}

/// ```text
/// assume(x < 0);
/// while (x < 0) { x += y; y += 1; }
/// assert(y > 0);
/// ```
pub fn example4() -> ProgramSpec {
    ProgramSpec::new(
        state_vars(),
        x1().lt(0),
        x1().lt(0),
        x2().equals(x1() + y1()) & y2().equals(y1() + 1),
        y2().gt(0),
    )
}

/// All examples with their names.
pub fn all() -> Vec<(&'static str, ProgramSpec)> {
    vec![
        ("example1", example1()),
        ("example2", example2()),
        ("example3", example3()),
        ("example4", example4()),
    ]
}
