use std::{fmt::Display, ops::Deref};

/// Non-negative share of a whole, stored as a percentage value (`150.0` is one and a half).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0.round())
    }
}

impl Percentage {
    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value < 0. || value.is_nan() {
            None
        } else {
            Some(Percentage(value))
        }
    }

    /// Share of `whole` taken by `part`. A zero `whole` yields zero.
    pub fn of(part: u64, whole: u64) -> Percentage {
        if whole == 0 {
            return Percentage(0.);
        }
        Percentage(part as f64 / whole as f64 * 100.)
    }

    pub fn fraction(&self) -> f64 {
        self.0 / 100.
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::Percentage;

    #[test]
    fn test_percentage_of() {
        assert_eq!(*Percentage::of(50, 100), 50.);
        assert_eq!(Percentage::of(150, 100).fraction(), 1.5);
        assert_eq!(*Percentage::of(3, 0), 0.);
        assert_eq!(Percentage::of(1, 3).to_string(), "33%");
        assert!(Percentage::new_opt(-1.).is_none());
    }
}
