//! Cardinality estimation.
//!
//! Selectivity defaults are deliberately coarse; they only need to rank
//! join orders, not predict row counts precisely.

use crate::sql::planner::{BinaryOperator, Expr};

pub struct CardinalityEstimator {
    pub eq_selectivity: f64,
    pub range_selectivity: f64,
    pub like_selectivity: f64,
    pub in_selectivity: f64,
    pub null_selectivity: f64,
}

impl Default for CardinalityEstimator {
    fn default() -> Self {
        Self {
            eq_selectivity: 0.1,
            range_selectivity: 0.3,
            like_selectivity: 0.25,
            in_selectivity: 0.2,
            null_selectivity: 0.1,
        }
    }
}

impl CardinalityEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of input rows a predicate lets through.
    pub fn selectivity(&self, predicate: &Expr) -> f64 {
        match predicate {
            Expr::BinaryOp { op, left, right } => match op {
                BinaryOperator::Eq => self.eq_selectivity,
                BinaryOperator::NotEq => 1.0 - self.eq_selectivity,
                BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq => self.range_selectivity,
                BinaryOperator::And => {
                    (self.selectivity(left) * self.selectivity(right)).max(1e-6)
                }
                BinaryOperator::Or => {
                    let l = self.selectivity(left);
                    let r = self.selectivity(right);
                    (l + r - l * r).min(1.0)
                }
                // arithmetic in predicate position is opaque
                _ => 1.0,
            },
            Expr::Like { negated, .. } => {
                if *negated {
                    1.0 - self.like_selectivity
                } else {
                    self.like_selectivity
                }
            }
            Expr::InList { list, negated, .. } => {
                let s = (self.in_selectivity * list.len().max(1) as f64 / 5.0).min(1.0);
                if *negated { 1.0 - s } else { s }
            }
            Expr::IsNull(_) => self.null_selectivity,
            Expr::IsNotNull(_) => 1.0 - self.null_selectivity,
            Expr::Literal(crate::types::Value::Bool(false)) => 0.0,
            _ => 1.0,
        }
    }

    /// Rows surviving a filter over `input_rows`.
    pub fn filtered_rows(&self, input_rows: f64, predicate: Option<&Expr>) -> f64 {
        match predicate {
            Some(p) => (input_rows * self.selectivity(p)).max(1.0),
            None => input_rows,
        }
    }

    /// Equi-join output estimate.
    pub fn join_rows(&self, left_rows: f64, right_rows: f64, conditions: usize) -> f64 {
        if conditions == 0 {
            // Cartesian product
            return left_rows * right_rows;
        }
        let mut selectivity = self.eq_selectivity;
        for _ in 1..conditions {
            selectivity *= 0.5;
        }
        (left_rows * right_rows * selectivity).max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(col: &str) -> Expr {
        Expr::BinaryOp {
            left: Box::new(Expr::column(col)),
            op: BinaryOperator::Eq,
            right: Box::new(Expr::literal(1i64)),
        }
    }

    #[test]
    fn and_narrows_or_widens() {
        let est = CardinalityEstimator::new();
        let a = eq("a");
        let b = eq("b");
        let and = Expr::BinaryOp {
            left: Box::new(a.clone()),
            op: BinaryOperator::And,
            right: Box::new(b.clone()),
        };
        let or = Expr::BinaryOp {
            left: Box::new(a.clone()),
            op: BinaryOperator::Or,
            right: Box::new(b),
        };
        assert!(est.selectivity(&and) < est.selectivity(&a));
        assert!(est.selectivity(&or) > est.selectivity(&a));
        assert!(est.selectivity(&or) <= 1.0);
    }

    #[test]
    fn cross_join_is_product() {
        let est = CardinalityEstimator::new();
        assert_eq!(est.join_rows(10.0, 20.0, 0), 200.0);
    }

    #[test]
    fn more_conditions_tighter_estimate() {
        let est = CardinalityEstimator::new();
        let one = est.join_rows(1000.0, 1000.0, 1);
        let two = est.join_rows(1000.0, 1000.0, 2);
        assert!(two < one);
    }

    #[test]
    fn filtered_rows_never_zero() {
        let est = CardinalityEstimator::new();
        assert!(est.filtered_rows(10.0, Some(&eq("a"))) >= 1.0);
        assert_eq!(est.filtered_rows(10.0, None), 10.0);
    }
}
