mod tests_l0_to_l1;
