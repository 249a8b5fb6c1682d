//! Macros for declaring states.

/// Declare `const` [`State`](crate::core::State) items.
///
/// # Example
///
/// ```
/// use fsm_dispatch::states;
///
/// states! {
///     pub OPEN = "open";
///     pub CLOSE = "close";
///     LOCKED = "locked";
/// }
///
/// assert_eq!(OPEN.as_str(), "open");
/// assert!(!CLOSE.matches(&LOCKED));
/// ```
#[macro_export]
macro_rules! states {
    (
        $(
            $(#[$meta:meta])*
            $vis:vis $name:ident = $value:literal
        );* $(;)?
    ) => {
        $(
            $(#[$meta])*
            $vis const $name: $crate::core::State = $crate::core::State::from_static($value);
        )*
    };
}
