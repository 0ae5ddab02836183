mod operator;
mod registry;
