//! Macros for ergonomic tree construction.

/// Generate an enum whose variants name the states of a tree.
///
/// Each variant converts into the [`StateKey`](crate::core::StateKey) with
/// the variant's name, so the enum can be used wherever a key is expected.
///
/// # Example
///
/// ```
/// use treestate::state_keys;
/// use treestate::core::StateKey;
/// use treestate::descriptor::NodeDescriptor;
///
/// state_keys! {
///     pub enum Door {
///         Root,
///         Open,
///         Closed,
///     }
/// }
///
/// let tree = NodeDescriptor::root(Door::Root)
///     .child(NodeDescriptor::leaf(Door::Open))
///     .child(NodeDescriptor::leaf(Door::Closed))
///     .initial(Door::Closed);
///
/// assert_eq!(StateKey::from(Door::Open).as_str(), "Open");
/// assert_eq!(Door::ALL.len(), 3);
/// ```
#[macro_export]
macro_rules! state_keys {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $name {
            /// Every variant in declaration order.
            pub const ALL: &'static [$name] = &[$(Self::$variant),*];

            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),*
                }
            }

            pub fn key(&self) -> $crate::core::StateKey {
                $crate::core::StateKey::new(self.name())
            }
        }

        impl ::core::convert::From<$name> for $crate::core::StateKey {
            fn from(state: $name) -> Self {
                state.key()
            }
        }

        impl ::core::cmp::PartialEq<$name> for $crate::core::StateKey {
            fn eq(&self, other: &$name) -> bool {
                self.as_str() == other.name()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::core::StateKey;

    state_keys! {
        enum Workflow {
            Root,
            Processing,
            Complete,
        }
    }

    #[test]
    fn state_keys_macro_generates_conversions() {
        let key: StateKey = Workflow::Processing.into();
        assert_eq!(key.as_str(), "Processing");
        assert_eq!(key, Workflow::Processing);
        assert!(key != Workflow::Complete);
        assert_eq!(Workflow::ALL, &[Workflow::Root, Workflow::Processing, Workflow::Complete]);
    }
}
