mod test_generator;
mod test_norm;
mod test_rope;
mod test_sampling;
