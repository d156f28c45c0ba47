/// Package assigned to classes that live outside any named package.
pub const DEFAULT_PACKAGE: &str = "Default";

/// Reference types (`L<name>;`) mentioned by a field or method descriptor, in
/// order of appearance. Primitive codes and array markers contribute nothing
/// on their own.
pub fn descriptor_types(descriptor: &str) -> Vec<&str> {
    let mut types = Vec::new();
    let mut rest = descriptor;
    while let Some(start) = rest.find('L') {
        let after = &rest[start + 1..];
        let Some(end) = after.find(';') else {
            break;
        };
        types.push(&after[..end]);
        rest = &after[end + 1..];
    }
    types
}

/// Resolve a class name (internal or dotted) or an array descriptor to the
/// class it denotes. Arrays resolve to their innermost element type; arrays of
/// primitives denote no class.
pub fn element_class(name: &str) -> Option<&str> {
    if name.starts_with('[') {
        descriptor_types(name).into_iter().next()
    } else if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Package of a class name, `Default` when the name has no package part.
pub fn package_of(name: &str) -> Option<String> {
    let class = element_class(name)?;
    let dotted = class.replace('/', ".");
    match dotted.rfind('.') {
        Some(pos) if pos > 0 => Some(dotted[..pos].to_string()),
        _ => Some(DEFAULT_PACKAGE.to_string()),
    }
}

/// Package of the type denoted by a field descriptor (`Lx/Y;`, `[Lx/Y;`).
/// Primitive and `void` descriptors have none.
pub fn package_of_descriptor(descriptor: &str) -> Option<String> {
    descriptor_types(descriptor)
        .into_iter()
        .next()
        .and_then(package_of)
}

/// Dotted name of the outermost class enclosing `name` (`a.Outer$Inner` maps
/// to `a.Outer`).
pub fn top_level_class(name: &str) -> Option<String> {
    let class = element_class(name)?;
    let dotted = class.replace('/', ".");
    let simple_start = dotted.rfind('.').map_or(0, |pos| pos + 1);
    match dotted[simple_start..].find('$') {
        // A leading `$` is part of the name, not a nesting marker.
        Some(pos) if pos > 0 => Some(dotted[..simple_start + pos].to_string()),
        _ => Some(dotted),
    }
}
