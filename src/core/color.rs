use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Linear RGB triple used for closure weights, tints and evaluated values.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn gray(value: f32) -> Self {
        Self::new(value, value, value)
    }

    pub fn avg(&self) -> f32 {
        (self.r + self.g + self.b) / 3.0
    }

    pub fn max_channel(&self) -> f32 {
        self.r.max(self.g).max(self.b)
    }

    pub fn min_channel(&self) -> f32 {
        self.r.min(self.g).min(self.b)
    }

    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite()
    }

    /// Clamps every channel into `[0, 1]`. NaN channels become 0.
    pub fn saturate(&self) -> Color {
        self.map(saturatef)
    }

    pub fn max(&self, value: f32) -> Color {
        self.map(|c| c.max(value))
    }

    pub fn map<F: Fn(f32) -> f32>(&self, f: F) -> Color {
        Color::new(f(self.r), f(self.g), f(self.b))
    }

    pub fn lerp(a: Color, b: Color, t: f32) -> Color {
        a * (1.0 - t) + b * t
    }
}

pub fn saturatef(value: f32) -> f32 {
    if value > 0.0 {
        value.min(1.0)
    } else {
        0.0
    }
}

macro_rules! color_binary_op {
    ( $( ( $trait:ident, $func:ident, $assign_trait:ident, $assign_func:ident, $op:tt ) ),+ $(,)? ) => {
        $(
            impl $trait for Color {
                type Output = Self;

                fn $func(self, rhs: Color) -> Self::Output {
                    Self::new(self.r $op rhs.r, self.g $op rhs.g, self.b $op rhs.b)
                }
            }
            impl $assign_trait for Color {
                fn $assign_func(&mut self, rhs: Color) {
                    *self = *self $op rhs;
                }
            }
            impl $trait<f32> for Color {
                type Output = Self;

                fn $func(self, rhs: f32) -> Self::Output {
                    Self::new(self.r $op rhs, self.g $op rhs, self.b $op rhs)
                }
            }
            impl $assign_trait<f32> for Color {
                fn $assign_func(&mut self, rhs: f32) {
                    *self = *self $op rhs;
                }
            }
            impl $trait<Color> for f32 {
                type Output = Color;

                fn $func(self, rhs: Color) -> Self::Output {
                    Color::new(self $op rhs.r, self $op rhs.g, self $op rhs.b)
                }
            }
        )+
    };
}

color_binary_op! {
    (Add, add, AddAssign, add_assign, +),
    (Sub, sub, SubAssign, sub_assign, -),
    (Mul, mul, MulAssign, mul_assign, *),
    (Div, div, DivAssign, div_assign, /),
}

impl Neg for Color {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.r, -self.g, -self.b)
    }
}

impl From<[f32; 3]> for Color {
    fn from(value: [f32; 3]) -> Self {
        Color::new(value[0], value[1], value[2])
    }
}

impl From<Color> for [f32; 3] {
    fn from(color: Color) -> Self {
        [color.r, color.g, color.b]
    }
}
