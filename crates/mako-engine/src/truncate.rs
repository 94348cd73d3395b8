const DEFAULT_MAX_OUTPUT: usize = 256 * 1024; // 256KB
const BASH_MAX_OUTPUT: usize = 1024 * 1024; // 1MB
const READ_MAX_OUTPUT: usize = 512 * 1024;

/// Returns the max output size for a given tool name.
pub fn max_output_for_tool(tool_name: &str) -> usize {
    match tool_name {
        "bash" => BASH_MAX_OUTPUT,
        "read_file" => READ_MAX_OUTPUT,
        _ => DEFAULT_MAX_OUTPUT,
    }
}

/// Truncate tool output if it exceeds `max_bytes`.
/// Cuts at a char boundary and appends a marker showing original vs truncated size.
pub fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let boundary = floor_char_boundary(output, max_bytes);
    let truncated = &output[..boundary];
    format!(
        "{truncated}\n\n[truncated: {} bytes -> {} bytes]",
        output.len(),
        boundary
    )
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
