
mod failure;
