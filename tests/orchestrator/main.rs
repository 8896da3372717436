mod sessions;
mod submit;
mod support;
