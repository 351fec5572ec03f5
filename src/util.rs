//! Utility functions used by the file format modules.

use std::path::Path;
use std::io::Read;

use crate::error::Result;

use byteordered::byteorder::ReadBytesExt;

/// Check whether the file extension ends with ".gz".
pub fn is_gz_file<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    path.as_ref()
        .file_name()
        .map(|a| a.to_string_lossy().ends_with(".gz"))
        .unwrap_or(false)
}


/// Read a string terminated by two consecutive newline characters, as used for the creator line of surf files. Both newlines are consumed but not part of the returned String.
pub fn read_double_newline_terminated_string<S>(input: &mut S) -> Result<String>
where
    S: Read,
{
    let mut info_line = String::new();
    let mut prev_char = '\0';
    loop {
        let cur_char = input.read_u8()? as char;
        if cur_char == '\n' && prev_char == '\n' {
            info_line.pop();
            return Ok(info_line);
        }
        info_line.push(cur_char);
        prev_char = cur_char;
    }
}


/// Read a fixed length zero-terminated byte string of the given length from the input. Embedded '\0' chars are allowed, but not added to the returned String.
pub fn read_fixed_length_string<S>(input: &mut S, len: usize) -> Result<String>
where
    S: Read,
{
    let mut info_line = String::with_capacity(len);
    for _  in 0..len   {
        let cur_char = input.read_u8()? as char;
        if cur_char != '\0'  {
            info_line.push(cur_char);
        }
    }
    Ok(info_line)
}
