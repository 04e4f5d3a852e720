mod completions;
mod kv;
