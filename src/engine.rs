export![backend, command, fence, frame, texture];
