mod tests_recovery;
