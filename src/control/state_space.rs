//! Discrete-time state-space model.
//!
//!   x(k+1) = A x(k) + B u(k)
//!     y(k) = C x(k) + D u(k)
//!
//! Dimensions are checked once at construction. `update` takes one value per model
//! input; a short or long input vector is a caller bug and trips a debug assertion.

use crate::error::ConfigError;

/// Dense row-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from nested rows. All rows must have equal length.
    pub fn from_rows(rows: &[&[f64]]) -> Result<Self, ConfigError> {
        let cols = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != cols) {
            return Err(ConfigError::DimensionMismatch("ragged matrix rows".into()));
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.iter().flat_map(|r| r.iter().copied()).collect(),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    fn at(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    /// self * v, with `v.len() == cols`.
    fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        (0..self.rows)
            .map(|r| (0..self.cols).map(|c| self.at(r, c) * v[c]).sum())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct StateSpace {
    a: Matrix,
    b: Matrix,
    c: Matrix,
    d: Matrix,
    state: Vec<f64>,
}

impl StateSpace {
    pub fn new(
        a: Matrix,
        b: Matrix,
        c: Matrix,
        d: Matrix,
        state: Option<Vec<f64>>,
    ) -> Result<Self, ConfigError> {
        let (ar, ac) = a.shape();
        let (br, bc) = b.shape();
        let (cr, cc) = c.shape();
        let (dr, dc) = d.shape();

        if ar != ac {
            return Err(ConfigError::DimensionMismatch(format!("A must be square, got {ar}x{ac}")));
        }
        if ar != br {
            return Err(ConfigError::DimensionMismatch(format!("A has {ar} rows, B has {br}")));
        }
        if cr != dr {
            return Err(ConfigError::DimensionMismatch(format!("C has {cr} rows, D has {dr}")));
        }
        if ac != cc {
            return Err(ConfigError::DimensionMismatch(format!("A has {ac} columns, C has {cc}")));
        }
        if bc != dc {
            return Err(ConfigError::DimensionMismatch(format!("B has {bc} columns, D has {dc}")));
        }

        let order = ar;
        let state = match state {
            None => vec![0.0; order],
            Some(s) if s.len() == order => s,
            Some(s) => {
                return Err(ConfigError::StateOrder {
                    expected: order,
                    got: s.len(),
                });
            }
        };

        Ok(Self { a, b, c, d, state })
    }

    /// Single-input single-output first-order lag: x' = a x + b u, y = x.
    pub fn first_order(a: f64, b: f64) -> Self {
        Self {
            a: Matrix { rows: 1, cols: 1, data: vec![a] },
            b: Matrix { rows: 1, cols: 1, data: vec![b] },
            c: Matrix { rows: 1, cols: 1, data: vec![1.0] },
            d: Matrix::zeros(1, 1),
            state: vec![0.0],
        }
    }

    pub fn order(&self) -> usize {
        self.state.len()
    }

    pub fn inputs(&self) -> usize {
        self.d.cols
    }

    pub fn outputs(&self) -> usize {
        self.d.rows
    }

    pub fn state(&self) -> &[f64] {
        &self.state
    }

    /// Advance one step. `u.len()` must equal `inputs()`.
    pub fn update(&mut self, u: &[f64]) -> Vec<f64> {
        debug_assert_eq!(u.len(), self.inputs(), "input vector length must match model inputs");
        let du = self.d.mul_vec(u);
        if self.state.is_empty() {
            return du;
        }
        let y = self
            .c
            .mul_vec(&self.state)
            .into_iter()
            .zip(du)
            .map(|(cx, du)| cx + du)
            .collect();
        let ax = self.a.mul_vec(&self.state);
        let bu = self.b.mul_vec(u);
        self.state = ax.into_iter().zip(bu).map(|(ax, bu)| ax + bu).collect();
        y
    }
}
