//! Minimal grep over stdin: prints every line the pattern matches.
//!
//! ```text
//! cargo run --example grep_lite -- 'ab+c' < input.txt
//! ```

use std::io::BufRead;

fn main() {
    let pattern = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("usage: grep_lite <pattern>");
            std::process::exit(2);
        }
    };

    let compiled = match regforge::acquire(&pattern) {
        Ok(compiled) => compiled,
        Err(e) => {
            eprintln!("grep_lite: {e}");
            std::process::exit(2);
        }
    };

    let stdin = std::io::stdin();
    let mut found = false;
    for line in stdin.lock().lines() {
        let line = line.expect("stdin read");
        let mut buf = line.clone().into_bytes();
        buf.push(0);
        let input = std::ffi::CStr::from_bytes_until_nul(&buf).expect("terminated");
        if let Some(m) = compiled.invoke(input) {
            let (start, end) = m.span();
            println!("{line}\t[{start}..{end}]");
            found = true;
        }
    }
    regforge::release(&pattern);
    std::process::exit(if found { 0 } else { 1 });
}
