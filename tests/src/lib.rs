#![cfg(test)]

mod discovery;
mod pipeline;
mod socks5;
mod support;
