#[allow(unused_imports)]
use std::ascii::AsciiExt;

// header values are raw byte sequences; tokens compare
// case-insensitively with surrounding whitespace ignored
fn token_is(val: &[u8], expected: &str) -> bool {
    let token = trim_lws(val);
    token.len() == expected.len()
        && token.iter().zip(expected.as_bytes())
            .all(|(&a, &b)| a.to_ascii_lowercase() == b)
}

fn trim_lws(mut val: &[u8]) -> &[u8] {
    while let Some((&first, rest)) = val.split_first() {
        if !is_lws(first) {
            break;
        }
        val = rest;
    }
    while let Some((&last, rest)) = val.split_last() {
        if !is_lws(last) {
            break;
        }
        val = rest;
    }
    val
}

fn is_lws(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n')
}

pub fn is_close(val: &[u8]) -> bool {
    token_is(val, "close")
}

pub fn is_keep_alive(val: &[u8]) -> bool {
    token_is(val, "keep-alive")
}

// `Connection` may carry a comma-separated token list
pub fn connection_has<F>(val: &str, pred: F) -> bool
    where F: Fn(&[u8]) -> bool
{
    val.as_bytes().split(|&x| x == b',').any(|tok| pred(tok))
}
