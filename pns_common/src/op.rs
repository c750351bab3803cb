/// Forwards arithmetic operator traits on a single-field newtype to its inner value.
///
/// ```ignore
/// newtype_ops!(MinorUnits { binary: Add::add, Sub::sub; assign: AddAssign::add_assign; unary: Neg::neg });
/// ```
#[macro_export]
macro_rules! newtype_ops {
    ($ty:ident {
        binary: $($b_trait:ident::$b_fn:ident),* ;
        assign: $($a_trait:ident::$a_fn:ident),* ;
        unary: $($u_trait:ident::$u_fn:ident),*
    }) => {
        $(
            impl $b_trait for $ty {
                type Output = Self;

                fn $b_fn(self, rhs: Self) -> Self {
                    Self(self.0.$b_fn(rhs.0))
                }
            }
        )*
        $(
            impl $a_trait for $ty {
                fn $a_fn(&mut self, rhs: Self) {
                    self.0.$a_fn(rhs.0)
                }
            }
        )*
        $(
            impl $u_trait for $ty {
                type Output = Self;

                fn $u_fn(self) -> Self {
                    Self(self.0.$u_fn())
                }
            }
        )*
    };
}
