mod cloudflare_test;
mod test_utils;
