export![allocator, software];
