mod config;
mod streams;
