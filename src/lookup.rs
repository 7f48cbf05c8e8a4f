/// Return the first defined value along a scope chain ordered from most to
/// least specific. Used identically by the Parser (per-section, per-chapter,
/// then global XPaths) and the Scripter (per-package, per-section,
/// per-chapter templates and rewrite rules).
pub fn first_defined<'a, T: ?Sized>(scopes: impl IntoIterator<Item = Option<&'a T>>) -> Option<&'a T> {
    scopes.into_iter().flatten().next()
}
