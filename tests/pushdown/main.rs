mod common;
mod properties;
mod settings;
