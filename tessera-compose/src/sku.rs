/// Normalize an axis value for use inside a SKU: trimmed, inner
/// whitespace collapsed to the separator, uppercased.
pub fn sanitize_value(value: &str, separator: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(separator)
        .to_uppercase()
}

/// Render a variant SKU. Patterns may reference `{parent}` and any
/// configured axis code, e.g. `"TEE-{color}-{size}"`. Without a pattern
/// the SKU is the parent SKU followed by the separator-joined values in
/// axis order.
pub fn render_sku(
    pattern: Option<&str>,
    parent_sku: &str,
    axis_values: &[(String, String)],
    separator: &str,
) -> String {
    match pattern {
        Some(pattern) => {
            let mut sku = pattern.replace("{parent}", parent_sku);
            for (code, value) in axis_values {
                let placeholder = format!("{{{}}}", code);
                sku = sku.replace(&placeholder, &sanitize_value(value, separator));
            }
            sku
        }
        None => {
            let mut parts = vec![parent_sku.to_string()];
            parts.extend(
                axis_values
                    .iter()
                    .map(|(_, value)| sanitize_value(value, separator)),
            );
            parts.join(separator)
        }
    }
}
