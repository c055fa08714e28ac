use super::BuiltinOutcome;
use crate::parser::ast::Stage;
use crate::runtime::Runtime;
use std::io::{self, Write};

/// Run-length encoded banner: each pair is a character and its repeat count.
const DRAGON_RLE: &[(char, usize)] = &[
    (' ', 13), ('_', 2), (' ', 12), ('_', 2), ('\n', 1), (' ', 12), ('/', 1), (' ', 2),
    ('\\', 1), ('_', 10), ('/', 1), (' ', 2), ('\\', 1), ('\n', 1), (' ', 11), ('/', 1),
    (' ', 4), ('o', 1), (' ', 8), ('o', 1), (' ', 4), ('\\', 1), ('\n', 1), (' ', 6), ('_', 4),
    ('/', 1), (' ', 7), ('\\', 1), ('_', 4), ('/', 1), (' ', 7), ('\\', 1), ('_', 4),
    ('\n', 1), (' ', 5), ('<', 1), ('_', 4), (' ', 22), ('_', 4), ('>', 1), ('\n', 1),
    (' ', 10), ('\\', 1), ('_', 3), ('/', 1), ('\\', 1), ('_', 10), ('/', 1), ('\\', 1),
    ('_', 3), ('/', 1), ('\n', 1), (' ', 14), ('/', 2), (' ', 10), ('\\', 2), ('\n', 1),
    (' ', 13), ('^', 3), (' ', 10), ('^', 3), ('\n', 1),
];

pub fn render() -> String {
    DRAGON_RLE
        .iter()
        .flat_map(|&(ch, count)| std::iter::repeat(ch).take(count))
        .collect()
}

pub fn builtin_dragon(
    _stage: &Stage,
    runtime: &mut Runtime,
    out: &mut dyn Write,
) -> io::Result<BuiltinOutcome> {
    out.write_all(render().as_bytes())?;
    runtime.set_last_exit_code(0);
    Ok(BuiltinOutcome::Executed)
}
