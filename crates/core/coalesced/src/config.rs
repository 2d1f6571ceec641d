#[derive(Clone, PartialEq, Eq, Debug, Default)]
/// Config values for [`CoalescionService`].
pub struct CoalescionServiceConfig {
    /// How many leaders may be running their work at once
    ///
    /// Leaders over the limit stay registered, so later callers still join
    /// them, but hold off on running their work until a slot frees up.
    pub max_concurrent: Option<usize>,
}
