pub mod octahedral;

export![cache, config, event, handle, layout, pipeline, sampling, source];
