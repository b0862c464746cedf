mod split_merge_test;
mod static_grid_test;
