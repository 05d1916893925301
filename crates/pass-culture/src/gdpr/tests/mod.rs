mod common;
mod extract;
