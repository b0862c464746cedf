mod coordination_loss_test;
mod shared_tree_test;
